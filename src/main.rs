//! Maison mail relay - one-time codes and order status emails

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use maison_storefront::config::{Env, RelayConfig};
use maison_storefront::relay::{self, HttpMailer, LogMailer, Mailer, RelayState};

#[tokio::main]
async fn main() -> Result<()> {
    let env = Env::from_process();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = RelayConfig::from_env(&env)?;

    let mailer: Arc<dyn Mailer> = match config.mail.clone() {
        Some(mail) => Arc::new(HttpMailer::new(mail)?),
        None => {
            tracing::warn!("MAIL_API_URL not set; emails will only be logged");
            Arc::new(LogMailer)
        }
    };
    let app = relay::router(RelayState::new(mailer), &config.allowed_origins);

    tracing::info!("Maison mail relay listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?, app).await?;
    Ok(())
}
