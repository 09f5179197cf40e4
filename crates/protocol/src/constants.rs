use std::fmt;

use serde::{Deserialize, Serialize};

/// Query/form parameter carrying the [`Action`] name.
pub const ACTION_PARAM: &str = "action";

/// Content hash sent when the part body is not hashed client-side.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Header carrying the signing timestamp on the part PUT.
pub const HEADER_AMZ_DATE: &str = "x-amz-date";

/// Header carrying the pre-computed authorization on the part PUT.
pub const HEADER_AUTHORIZATION: &str = "Authorization";

/// The only PUT status accepted as a successful part upload.
pub const PUT_SUCCESS_STATUS: u16 = 200;

/// Upload-type hint sent with the completion request.
pub const DEFAULT_REQUEST_TYPE: &str = "blob";

/// Operation selector understood by the signing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "multipartStart")]
    Start,
    #[serde(rename = "multipartSignPart")]
    SignPart,
    #[serde(rename = "multipartComplete")]
    Complete,
    #[serde(rename = "multipartAbort")]
    Abort,
}

impl Action {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "multipartStart",
            Action::SignPart => "multipartSignPart",
            Action::Complete => "multipartComplete",
            Action::Abort => "multipartAbort",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
