use actix_web::{web, HttpResponse};
use mailer_common::email::EmailSender;
use mailer_common::request_io::InputSendRequest;

use crate::env::Config;
use crate::handlers::dispatch::{self, SendMailError};
use crate::handlers::error::HttpErrorResponse;

pub async fn send(
    conf: web::Data<Config>,
    email_sender: web::Data<EmailSender>,
    request: web::Json<InputSendRequest>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let result = dispatch::send_mail(
        &conf,
        &***email_sender,
        &request.subject,
        &request.message,
        &request.recipients,
    )
    .await;

    match result {
        Ok(()) => (),
        Err(SendMailError::Relay(e)) => {
            log::error!("{e}");
            return Err(SendMailError::Relay(e).into());
        }
        Err(e) => {
            log::info!("Rejected send request: {e}");
            return Err(e.into());
        }
    }

    Ok(HttpResponse::Ok().finish())
}
