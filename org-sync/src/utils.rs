use crate::github::RemoteError;
use anyhow::Context;
use reqwest::StatusCode;
use reqwest::blocking::Response;
use serde::de::DeserializeOwned;
use std::str::FromStr;

pub trait ResponseExt {
    fn custom_error_for_status(self) -> anyhow::Result<Response>;
    fn json_annotated<T: DeserializeOwned>(self) -> anyhow::Result<T>;
}

impl ResponseExt for Response {
    /// Turns error statuses into errors carrying the response body. Rate
    /// limit responses become a [`RemoteError`] so callers can retry them.
    fn custom_error_for_status(self) -> anyhow::Result<Response> {
        match self.error_for_status_ref() {
            Ok(_) => Ok(self),
            Err(err) => {
                let status = self.status();
                let exhausted = self
                    .headers()
                    .get("x-ratelimit-remaining")
                    .is_some_and(|remaining| remaining.as_bytes() == b"0");
                let body = self.text()?;
                if matches!(status, StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS) {
                    if exhausted {
                        return Err(RemoteError::RateLimited.into());
                    }
                    if mentions_secondary_rate_limit(&body) {
                        return Err(RemoteError::SecondaryRateLimited.into());
                    }
                }
                Err(err).context(format!("Body: {:?}", body))
            }
        }
    }

    /// Try to load the response as JSON. If it fails, include the response body
    /// as text in the error message, so that it is easier to understand what was
    /// the problem.
    fn json_annotated<T: DeserializeOwned>(self) -> anyhow::Result<T> {
        let text = self.text()?;

        serde_json::from_str::<T>(&text).with_context(|| {
            let body_content = serde_json::Value::from_str(&text)
                .and_then(|v| serde_json::to_string_pretty(&v))
                .unwrap_or(text);

            format!(
                "Cannot deserialize type `{}` from the following response body:\n{body_content}",
                std::any::type_name::<T>(),
            )
        })
    }
}

pub(crate) fn mentions_secondary_rate_limit(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("secondary rate limit") || message.contains("abuse detection")
}

#[cfg(test)]
mod tests {
    use super::mentions_secondary_rate_limit;

    #[test]
    fn secondary_rate_limit_messages() {
        assert!(mentions_secondary_rate_limit(
            "You have exceeded a secondary rate limit. Please wait a few minutes."
        ));
        assert!(mentions_secondary_rate_limit(
            "You have triggered an abuse detection mechanism."
        ));
        assert!(!mentions_secondary_rate_limit("Not Found"));
    }
}
