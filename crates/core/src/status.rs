//! HTTP status codes carried in JSON response envelopes

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// An HTTP status code in the registered 100..=511 range.
///
/// Serialized on the wire as a bare integer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u16", into = "u16")]
pub struct StatusCode(u16);

impl StatusCode {
    /// Converts a raw integer into a `StatusCode`.
    ///
    /// # Errors
    /// Returns `Error::InvalidStatusCode` outside the 100..=511 range.
    pub fn from_u16(code: u16) -> Result<Self, Error> {
        if (100..=511).contains(&code) {
            Ok(Self(code))
        } else {
            Err(Error::InvalidStatusCode(code))
        }
    }

    /// The raw integer value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Whether the code is in the 2xx class.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Whether the code is in the 4xx class.
    #[must_use]
    pub const fn is_client_error(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Whether the code is in the 5xx class.
    #[must_use]
    pub const fn is_server_error(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }
}

impl TryFrom<u16> for StatusCode {
    type Error = Error;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::from_u16(code)
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> Self {
        code.as_u16()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! status_codes {
    ($( ($code:expr, $konst:ident); )+) => {
        impl StatusCode {
            $(
                #[doc = concat!("Status code ", stringify!($code), ".")]
                pub const $konst: StatusCode = StatusCode($code);
            )+
        }
    };
}

status_codes! {
    (100, CONTINUE);
    (101, SWITCHING_PROTOCOLS);
    (102, PROCESSING);
    (103, EARLY_HINTS);

    (200, OK);
    (201, CREATED);
    (202, ACCEPTED);
    (203, NON_AUTHORITATIVE_INFORMATION);
    (204, NO_CONTENT);
    (205, RESET_CONTENT);
    (206, PARTIAL_CONTENT);
    (207, MULTI_STATUS);
    (208, ALREADY_REPORTED);
    (226, IM_USED);

    (300, MULTIPLE_CHOICES);
    (301, MOVED_PERMANENTLY);
    (302, FOUND);
    (303, SEE_OTHER);
    (304, NOT_MODIFIED);
    (305, USE_PROXY);
    (306, SWITCH_PROXY);
    (307, TEMPORARY_REDIRECT);
    (308, PERMANENT_REDIRECT);

    (400, BAD_REQUEST);
    (401, UNAUTHORIZED);
    (402, PAYMENT_REQUIRED);
    (403, FORBIDDEN);
    (404, NOT_FOUND);
    (405, METHOD_NOT_ALLOWED);
    (406, NOT_ACCEPTABLE);
    (407, PROXY_AUTHENTICATION_REQUIRED);
    (408, REQUEST_TIMEOUT);
    (409, CONFLICT);
    (410, GONE);
    (411, LENGTH_REQUIRED);
    (412, PRECONDITION_FAILED);
    (413, PAYLOAD_TOO_LARGE);
    (414, URI_TOO_LONG);
    (415, UNSUPPORTED_MEDIA_TYPE);
    (416, RANGE_NOT_SATISFIABLE);
    (417, EXPECTATION_FAILED);
    (418, IM_A_TEAPOT);
    (421, MISDIRECTED_REQUEST);
    (422, UNPROCESSABLE_ENTITY);
    (423, LOCKED);
    (424, FAILED_DEPENDENCY);
    (425, TOO_EARLY);
    (426, UPGRADE_REQUIRED);
    (428, PRECONDITION_REQUIRED);
    (429, TOO_MANY_REQUESTS);
    (431, REQUEST_HEADER_FIELDS_TOO_LARGE);
    (451, UNAVAILABLE_FOR_LEGAL_REASONS);

    (500, INTERNAL_SERVER_ERROR);
    (501, NOT_IMPLEMENTED);
    (502, BAD_GATEWAY);
    (503, SERVICE_UNAVAILABLE);
    (504, GATEWAY_TIMEOUT);
    (505, HTTP_VERSION_NOT_SUPPORTED);
    (506, VARIANT_ALSO_NEGOTIATES);
    (507, INSUFFICIENT_STORAGE);
    (508, LOOP_DETECTED);
    (510, NOT_EXTENDED);
    (511, NETWORK_AUTHENTICATION_REQUIRED);
}
