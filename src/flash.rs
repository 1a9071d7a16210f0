//! One-shot status messages carried from a form submission to the next rendered page.
//!
//! A submission handler attaches a [`Flash`] to its redirect as a cookie. The next page render
//! shows it and removes the cookie in the same response, so a message is never displayed twice.

use actix_web::HttpRequest;
use actix_web::cookie::Cookie;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

pub const FLASH_COOKIE: &str = "flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Warning,
    Error,
}

impl Level {
    /// CSS class of the banner.
    pub fn class(&self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Warning => "warning",
            Level::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: Level,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: Level::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
        }
    }

    fn encode(&self) -> String {
        // Serializing a struct of a unit enum and a string cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    fn decode(value: &str) -> Option<Self> {
        let json = URL_SAFE_NO_PAD.decode(value).ok()?;
        serde_json::from_slice(&json).ok()
    }

    pub fn to_cookie(&self) -> Cookie<'static> {
        Cookie::build(FLASH_COOKIE, self.encode())
            .path("/")
            .http_only(true)
            .finish()
    }

    /// The message carried by `req`, if any. Malformed cookies are ignored.
    pub fn from_request(req: &HttpRequest) -> Option<Self> {
        req.cookie(FLASH_COOKIE)
            .and_then(|cookie| Self::decode(cookie.value()))
    }

    /// A cookie that clears the flash slot on the client.
    pub fn removal() -> Cookie<'static> {
        let mut cookie = Cookie::build(FLASH_COOKIE, "").path("/").finish();
        cookie.make_removal();
        cookie
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn cookie_carries_the_message() {
        let flash = Flash::warning("Attendance for today already taken!");
        let cookie = flash.to_cookie();
        assert_eq!(cookie.name(), FLASH_COOKIE);
        assert!(!cookie.value().contains(' '));

        let req = TestRequest::default().cookie(cookie).to_http_request();
        assert_eq!(Flash::from_request(&req), Some(flash));
    }

    #[test]
    fn malformed_cookie_is_ignored() {
        let req = TestRequest::default()
            .cookie(Cookie::new(FLASH_COOKIE, "%%%not-base64"))
            .to_http_request();
        assert_eq!(Flash::from_request(&req), None);

        let req = TestRequest::default().to_http_request();
        assert_eq!(Flash::from_request(&req), None);
    }

    #[test]
    fn removal_cookie_expires_immediately() {
        let cookie = Flash::removal();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age().map(|age| age.whole_seconds()), Some(0));
    }
}
