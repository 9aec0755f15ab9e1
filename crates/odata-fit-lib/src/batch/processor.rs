//! Batch orchestration.
//!
//! Items are processed strictly in order on the calling task. Each leaf part
//! is resolved into an [`InnerRequest`], dispatched, and its response framed
//! immediately, so the output always mirrors the order of the input. A
//! failure stops processing unless the client asked to continue on error.

use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use url::Url;

use super::dispatch::{Dispatcher, InnerResponse};
use super::framer::{begin_changeset, end_changeset, new_changeset_boundary, write_single};
use super::multipart::{split_parts, BatchPart, MultipartWriter};
use super::references::ReferenceTable;
use super::request::InnerRequest;
use super::{CONTINUE_ON_ERROR, RESPONSE_BOUNDARY};
use crate::error::Result;
use crate::fault::ODataFault;
use crate::format::ContentFormat;
use crate::version::ProtocolVersion;

/// Per-call settings of a batch.
#[derive(Debug, Clone)]
pub struct BatchContext {
    /// Protocol version of the endpoint the batch was posted to.
    pub version: ProtocolVersion,
    /// Format of synthesized faults.
    pub format: ContentFormat,
    /// Service root relative targets are resolved against, e.g. `http://host/V40/`.
    pub service_root: Url,
    /// Keep going after a failed item.
    pub continue_on_error: bool,
}

impl BatchContext {
    /// Context with JSON faults that halts on the first failure.
    pub fn new(version: ProtocolVersion, service_root: Url) -> Self {
        Self {
            version,
            format: ContentFormat::default(),
            service_root,
            continue_on_error: false,
        }
    }

    /// Set the format of synthesized faults.
    pub fn with_format(mut self, format: ContentFormat) -> Self {
        self.format = format;
        self
    }

    /// Keep processing after a failed item.
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Whether a `Prefer` header value asks for continue-on-error.
    pub fn continue_on_error_from(prefer: Option<&str>) -> bool {
        prefer.is_some_and(|value| value.contains(CONTINUE_ON_ERROR))
    }
}

/// Counters describing one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Top-level items processed (singles and changesets).
    pub items: usize,
    /// Leaf requests attempted.
    pub requests: usize,
    /// Leaf requests answered with an error.
    pub failures: usize,
    /// Whether a failure stopped processing.
    pub halted: bool,
}

/// The framed multipart body plus its summary.
#[derive(Debug, Clone)]
pub struct BatchResponse {
    /// Multipart body framed under [`RESPONSE_BOUNDARY`].
    pub body: Bytes,
    /// Counters for metrics and logging.
    pub summary: BatchSummary,
}

/// Runs batches against a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct BatchProcessor<D> {
    dispatcher: D,
}

impl<D> BatchProcessor<D>
where
    D: Dispatcher + Sync,
{
    /// Processor replaying requests through `dispatcher`.
    pub fn new(dispatcher: D) -> Self {
        Self { dispatcher }
    }

    /// The dispatcher inner requests go through.
    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Process a batch body whose envelope uses `boundary`.
    ///
    /// Only an envelope that cannot be split at all is an error; everything
    /// that goes wrong inside an item is framed as that item's response.
    pub async fn process(
        &self,
        context: &BatchContext,
        body: &[u8],
        boundary: &str,
    ) -> Result<BatchResponse> {
        let parts = split_parts(body, boundary)?;
        let mut out = MultipartWriter::new();
        let mut summary = BatchSummary::default();

        for part in &parts {
            summary.items += 1;
            let failed = match part.changeset_boundary() {
                Some(changeset) => {
                    self.process_changeset(context, part, &changeset, &mut out, &mut summary)
                        .await
                }
                None => self.process_single(context, part, &mut out, &mut summary).await,
            };

            if failed && !context.continue_on_error {
                summary.halted = true;
                break;
            }
        }

        out.close(RESPONSE_BOUNDARY);

        if summary.halted {
            tracing::warn!(
                items = summary.items,
                total = parts.len(),
                "batch halted after failure"
            );
        }
        tracing::info!(
            items = summary.items,
            requests = summary.requests,
            failures = summary.failures,
            halted = summary.halted,
            continue_on_error = context.continue_on_error,
            "batch processed"
        );

        Ok(BatchResponse {
            body: out.into_bytes(),
            summary,
        })
    }

    async fn process_single(
        &self,
        context: &BatchContext,
        part: &BatchPart,
        out: &mut MultipartWriter,
        summary: &mut BatchSummary,
    ) -> bool {
        let response = self
            .execute(context, part, &ReferenceTable::new(), summary)
            .await;
        write_single(out, RESPONSE_BOUNDARY, part.content_id().as_deref(), &response);
        response.is_error()
    }

    async fn process_changeset(
        &self,
        context: &BatchContext,
        part: &BatchPart,
        boundary: &str,
        out: &mut MultipartWriter,
        summary: &mut BatchSummary,
    ) -> bool {
        let members = match split_parts(&part.body, boundary) {
            Ok(members) => members,
            Err(err) => {
                tracing::warn!(error = %err, "unreadable changeset");
                summary.failures += 1;
                let response = fault_response(context, &ODataFault::from_error(&err));
                write_single(out, RESPONSE_BOUNDARY, part.content_id().as_deref(), &response);
                return true;
            }
        };

        let changeset = new_changeset_boundary();
        let mut references = ReferenceTable::new();
        let mut failed = false;
        begin_changeset(out, RESPONSE_BOUNDARY, &changeset);

        for (index, member) in members.iter().enumerate() {
            let own_id = member.content_id();
            let response = self.execute(context, member, &references, summary).await;

            if response.is_error() {
                failed = true;
                let content_id = own_id.unwrap_or_else(|| (index + 1).to_string());
                write_single(out, &changeset, Some(&content_id), &response);
                if !context.continue_on_error {
                    tracing::debug!(
                        skipped = members.len() - index - 1,
                        "changeset stopped at failed member"
                    );
                    break;
                }
                continue;
            }

            if let (Some(id), Some(location)) = (own_id.as_deref(), response.location()) {
                references.put(id, location);
            }
            write_single(out, &changeset, own_id.as_deref(), &response);
        }

        end_changeset(out, &changeset);
        failed
    }

    /// Resolve and dispatch one leaf part. Never fails: errors become faults.
    async fn execute(
        &self,
        context: &BatchContext,
        part: &BatchPart,
        references: &ReferenceTable,
        summary: &mut BatchSummary,
    ) -> InnerResponse {
        summary.requests += 1;

        let response = match InnerRequest::from_part(part, &context.service_root, references) {
            Err(err) => {
                tracing::warn!(error = %err, "batch part rejected");
                fault_response(context, &ODataFault::from_error(&err))
            }
            Ok(request) => {
                tracing::debug!(method = %request.method, url = %request.url, "dispatching batch request");
                match self.dispatcher.dispatch(&request).await {
                    Ok(response) => response,
                    Err(err) => {
                        tracing::warn!(error = %err, "batch request dispatch failed");
                        let fault = ODataFault::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
                        fault_response(context, &fault)
                    }
                }
            }
        };

        if response.is_error() {
            summary.failures += 1;
            tracing::warn!(status = response.status.as_u16(), "batch request failed");
        }
        response
    }
}

fn fault_response(context: &BatchContext, fault: &ODataFault) -> InnerResponse {
    InnerResponse::from_fault(fault, context.version, context.format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continue_on_error_from_prefer() {
        assert!(BatchContext::continue_on_error_from(Some("odata.continue-on-error")));
        assert!(BatchContext::continue_on_error_from(Some(
            "return=minimal, odata.continue-on-error"
        )));
        assert!(!BatchContext::continue_on_error_from(Some("respond-async")));
        assert!(!BatchContext::continue_on_error_from(None));
    }
}
