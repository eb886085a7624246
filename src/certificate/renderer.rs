//! HTTP client for the external PDF rendering service.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

use crate::domain::{Certificate, CertificateTemplate};
use crate::infra::{PdfRenderer, RenderedPdf, Result, ServiceError};

/// Renders certificate PDFs by POSTing to a rendering service.
pub struct HttpPdfRenderer {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    pdf_url: String,
    #[serde(default)]
    local_path: Option<PathBuf>,
}

impl HttpPdfRenderer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PdfRenderer for HttpPdfRenderer {
    async fn render<'a>(
        &self,
        certificate: &Certificate,
        template: Option<&'a CertificateTemplate>,
    ) -> Result<RenderedPdf> {
        let body = serde_json::json!({
            "certId": certificate.id,
            "certHash": certificate.cert_hash,
            "userId": certificate.user_id,
            "creditAmount": certificate.credit_amount,
            "issueDate": certificate.issue_date,
            "templatePath": template.map(|t| t.pdf_template_path.as_str()),
        });

        let response = self
            .client
            .post(format!("{}/render", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Internal(format!("renderer request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::Internal(format!(
                "renderer returned {}",
                response.status()
            )));
        }

        let rendered: RenderResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Internal(format!("renderer response malformed: {e}")))?;

        Ok(RenderedPdf {
            url: rendered.pdf_url,
            local_path: rendered.local_path,
        })
    }
}
