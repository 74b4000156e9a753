//! HTTP client for parser services answering in CoNLL-U.
//!
//! The service receives the raw text as the request body, the language in
//! the `Content-Language` header, and replies with a CoNLL-U document.

use crate::conllu::parse_conllu;
use crate::parser::{NlpParser, ParseError};
use crate::tree::ParseTree;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

pub struct ConlluHttpParser {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl ConlluHttpParser {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl NlpParser for ConlluHttpParser {
    async fn parse(&self, text: &str, language: &str) -> Result<Vec<ParseTree>, ParseError> {
        if text.trim().is_empty() {
            return Err(ParseError::EmptyInput);
        }
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Language", language)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .timeout(self.timeout)
            .body(text.to_string())
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ParseError::Timeout
                } else {
                    ParseError::Unavailable(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(endpoint = %self.endpoint, %status, "parser service error");
            return Err(ParseError::Unavailable(format!(
                "{} answered {status}",
                self.endpoint
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|err| ParseError::Unavailable(err.to_string()))?;
        let mut trees = parse_conllu(&body)?;
        if trees.len() == 1 {
            trees = trees.into_iter().map(|t| t.with_text(text)).collect();
        }
        Ok(trees)
    }

    fn name(&self) -> &str {
        "conllu-http"
    }
}
