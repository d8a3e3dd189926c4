//! Mail Worker Service - Entry Point
//!
//! Background worker that delivers mail envelopes from the `send-mail` topic.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    core_config::tracing::install_color_eyre();
    mail_worker::run().await
}
