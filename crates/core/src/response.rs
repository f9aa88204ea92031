//! Outbound response handle
//!
//! A `Response` is bound to exactly one reply topic, derived from the
//! request topic by swapping the leading `SERVER` segment for `CLIENT`. Its
//! `sent` flag latches on the first send and is what the dispatcher uses to
//! short-circuit a middleware chain.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use serde_json::Value;
use topica_transport::Transport;
use tracing::{debug, warn};

use crate::envelope;
use crate::error::Result;
use crate::status::StatusCode;
use crate::topic;

/// Handle for sending the reply to one inbound request.
///
/// Clones share the same `sent` flag.
#[derive(Clone)]
pub struct Response {
    reply_topic: String,
    transport: Arc<dyn Transport>,
    sent: Arc<AtomicBool>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("reply_topic", &self.reply_topic)
            .field("sent", &self.sent)
            .finish()
    }
}

impl Response {
    /// Binds a response to the reply topic paired with a request topic.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, request_topic: &str) -> Self {
        Self {
            reply_topic: topic::reply_topic_for(request_topic),
            transport,
            sent: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The reply topic this response publishes to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.reply_topic
    }

    /// Whether a send has already happened. The transition is
    /// one-directional: once `true`, always `true`.
    #[must_use]
    pub fn has_been_sent(&self) -> bool {
        self.sent.load(Ordering::SeqCst)
    }

    /// Sends a JSON response with the given status code.
    ///
    /// Exactly one response is expected per request. A second send is still
    /// published (the transport accepts it) but violates the
    /// single-response contract and is logged.
    ///
    /// # Errors
    /// Returns `Error::Codec` if the body cannot be encoded and
    /// `Error::Transport` if the publish fails.
    pub async fn send(&self, body: Value, status_code: StatusCode) -> Result<()> {
        let payload = envelope::encode_response(status_code, &body)?;
        self.publish(payload).await?;
        debug!("Published {} response on {}", status_code, self.reply_topic);
        Ok(())
    }

    /// Sends a raw binary response.
    ///
    /// Binary responses are unwrapped bytes and cannot carry a status code.
    ///
    /// # Errors
    /// Returns `Error::Transport` if the publish fails.
    pub async fn send_bytes(&self, bytes: Bytes) -> Result<()> {
        self.publish(bytes).await?;
        debug!("Published binary response on {}", self.reply_topic);
        Ok(())
    }

    async fn publish(&self, payload: Bytes) -> Result<()> {
        if self.sent.swap(true, Ordering::SeqCst) {
            warn!(
                "Response on {} was already sent; publishing again violates the single-response contract",
                self.reply_topic
            );
        }
        self.transport.publish(&self.reply_topic, payload).await?;
        Ok(())
    }
}

macro_rules! status_senders {
    ($( ($fn_name:ident, $konst:ident); )+) => {
        impl Response {
            $(
                #[doc = concat!(
                    "Sends a JSON response with status [`StatusCode::",
                    stringify!($konst),
                    "`]."
                )]
                ///
                /// # Errors
                /// Same as [`Response::send`].
                pub async fn $fn_name(&self, body: Value) -> Result<()> {
                    self.send(body, StatusCode::$konst).await
                }
            )+
        }
    };
}

status_senders! {
    (r#continue, CONTINUE);
    (switching_protocols, SWITCHING_PROTOCOLS);
    (processing, PROCESSING);
    (early_hints, EARLY_HINTS);

    (ok, OK);
    (created, CREATED);
    (accepted, ACCEPTED);
    (non_authoritative_information, NON_AUTHORITATIVE_INFORMATION);
    (no_content, NO_CONTENT);
    (reset_content, RESET_CONTENT);
    (partial_content, PARTIAL_CONTENT);
    (multi_status, MULTI_STATUS);
    (already_reported, ALREADY_REPORTED);
    (im_used, IM_USED);

    (multiple_choices, MULTIPLE_CHOICES);
    (moved_permanently, MOVED_PERMANENTLY);
    (found, FOUND);
    (see_other, SEE_OTHER);
    (not_modified, NOT_MODIFIED);
    (use_proxy, USE_PROXY);
    (switch_proxy, SWITCH_PROXY);
    (temporary_redirect, TEMPORARY_REDIRECT);
    (permanent_redirect, PERMANENT_REDIRECT);

    (bad_request, BAD_REQUEST);
    (unauthorized, UNAUTHORIZED);
    (payment_required, PAYMENT_REQUIRED);
    (forbidden, FORBIDDEN);
    (not_found, NOT_FOUND);
    (method_not_allowed, METHOD_NOT_ALLOWED);
    (not_acceptable, NOT_ACCEPTABLE);
    (proxy_authentication_required, PROXY_AUTHENTICATION_REQUIRED);
    (request_timeout, REQUEST_TIMEOUT);
    (conflict, CONFLICT);
    (gone, GONE);
    (length_required, LENGTH_REQUIRED);
    (precondition_failed, PRECONDITION_FAILED);
    (payload_too_large, PAYLOAD_TOO_LARGE);
    (uri_too_long, URI_TOO_LONG);
    (unsupported_media_type, UNSUPPORTED_MEDIA_TYPE);
    (range_not_satisfiable, RANGE_NOT_SATISFIABLE);
    (expectation_failed, EXPECTATION_FAILED);
    (im_a_teapot, IM_A_TEAPOT);
    (misdirected_request, MISDIRECTED_REQUEST);
    (unprocessable_entity, UNPROCESSABLE_ENTITY);
    (locked, LOCKED);
    (failed_dependency, FAILED_DEPENDENCY);
    (too_early, TOO_EARLY);
    (upgrade_required, UPGRADE_REQUIRED);
    (precondition_required, PRECONDITION_REQUIRED);
    (too_many_requests, TOO_MANY_REQUESTS);
    (request_header_fields_too_large, REQUEST_HEADER_FIELDS_TOO_LARGE);
    (unavailable_for_legal_reasons, UNAVAILABLE_FOR_LEGAL_REASONS);

    (internal_server_error, INTERNAL_SERVER_ERROR);
    (not_implemented, NOT_IMPLEMENTED);
    (bad_gateway, BAD_GATEWAY);
    (service_unavailable, SERVICE_UNAVAILABLE);
    (gateway_timeout, GATEWAY_TIMEOUT);
    (http_version_not_supported, HTTP_VERSION_NOT_SUPPORTED);
    (variant_also_negotiates, VARIANT_ALSO_NEGOTIATES);
    (insufficient_storage, INSUFFICIENT_STORAGE);
    (loop_detected, LOOP_DETECTED);
    (not_extended, NOT_EXTENDED);
    (network_authentication_required, NETWORK_AUTHENTICATION_REQUIRED);
}
