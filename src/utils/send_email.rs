use std::env;

use reqwest::Response;
use serde::Serialize;
use serde_json::json;

#[derive(Serialize)]
struct Address {
    email: String,
}

/// Send an email through the Mailtrap send API.  The API key comes from the
/// environment; callers are expected to have loaded their env file already.
pub async fn send_email(
    from: &str,
    to: &[String],
    subject: &str,
    text: &str,
    html: Option<String>,
) -> Result<Response, reqwest::Error> {
    let api_url = "https://send.api.mailtrap.io/api/send";
    let api_key = env::var("MAILTRAP_API_KEY").unwrap();

    let recipients: Vec<Address> = to
        .iter()
        .map(|email| Address {
            email: email.clone(),
        })
        .collect();
    let payload = json!({
        "from": Address { email: from.to_string() },
        "to": recipients,
        "subject": subject,
        "text": text,
        "html": html,
    });

    let client = reqwest::Client::new();
    client
        .post(api_url)
        .header("Api-Token", api_key)
        .json(&payload)
        .send()
        .await
}

#[cfg(test)]
mod tests {
    use std::{env, error::Error, path::Path};

    use super::send_email;

    #[ignore]
    #[tokio::test]
    async fn email_test() -> Result<(), Box<dyn Error>> {
        dotenvy::from_path(Path::new(".env/test.env")).unwrap();

        let res = send_email(
            &env::var("EMAIL_FROM").unwrap(),
            &[env::var("EMAIL_MAIN").unwrap()],
            "Plain email test",
            "Test email for the daily reports.",
            None,
        )
        .await?;
        println!("{:?}", res);

        Ok(())
    }
}
