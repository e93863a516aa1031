pub mod dispatch;
pub mod index;
pub mod send;

pub mod error {
    use actix_web::http::{header, StatusCode};
    use actix_web::{HttpResponse, HttpResponseBuilder, ResponseError};
    use mailer_common::request_io::OutputMessage;
    use std::fmt;
    use std::time::Duration;

    use super::dispatch::SendMailError;

    #[derive(Debug)]
    pub enum HttpErrorResponse {
        // 400
        IncorrectlyFormed(String),
        InvalidRequest(String),
        FailedToSend(String),

        // 429
        TooManyRequests(Duration),
    }

    impl std::error::Error for HttpErrorResponse {}

    impl fmt::Display for HttpErrorResponse {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                HttpErrorResponse::IncorrectlyFormed(msg) => {
                    write!(f, "Incorrectly formed request: {msg}")
                }
                HttpErrorResponse::InvalidRequest(msg) => write!(f, "Invalid request: {msg}"),
                HttpErrorResponse::FailedToSend(msg) => write!(f, "Failed to send email: {msg}"),
                HttpErrorResponse::TooManyRequests(retry_after) => write!(
                    f,
                    "Too many requests: retry after {}s",
                    retry_after_secs(*retry_after)
                ),
            }
        }
    }

    impl ResponseError for HttpErrorResponse {
        fn error_response(&self) -> HttpResponse {
            match self {
                // Callers aren't told why a request failed; the cause is only logged
                HttpErrorResponse::IncorrectlyFormed(_)
                | HttpErrorResponse::InvalidRequest(_)
                | HttpErrorResponse::FailedToSend(_) => {
                    HttpResponseBuilder::new(self.status_code()).finish()
                }
                HttpErrorResponse::TooManyRequests(retry_after) => {
                    HttpResponseBuilder::new(self.status_code())
                        .insert_header((header::RETRY_AFTER, retry_after_secs(*retry_after)))
                        .json(OutputMessage {
                            message: "Too many requests",
                        })
                }
            }
        }

        fn status_code(&self) -> StatusCode {
            match *self {
                HttpErrorResponse::IncorrectlyFormed(_)
                | HttpErrorResponse::InvalidRequest(_)
                | HttpErrorResponse::FailedToSend(_) => StatusCode::BAD_REQUEST,
                HttpErrorResponse::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            }
        }
    }

    impl From<SendMailError> for HttpErrorResponse {
        fn from(err: SendMailError) -> Self {
            match err {
                SendMailError::InvalidRequest(e) => {
                    HttpErrorResponse::InvalidRequest(e.to_string())
                }
                SendMailError::Relay(e) => HttpErrorResponse::FailedToSend(e.to_string()),
            }
        }
    }

    /// Whole seconds, rounded up so a client never retries before the window has ended.
    fn retry_after_secs(retry_after: Duration) -> u64 {
        let secs = retry_after.as_secs();

        if retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

}
