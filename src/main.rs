use std::sync::Arc;

use huddle::notify::{self, NotifyConfig, VoiceCallNotifier};
use huddle::relay::{DEFAULT_RELAY_PORT, Gateway, Registry};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let port = std::env::var("HUDDLE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_RELAY_PORT);
    let bind_addr = format!("0.0.0.0:{}", port);

    let notify_handle = NotifyConfig::from_env().map(|config| {
        let contacts = std::env::var("HUDDLE_CONTACTS")
            .map(|raw| notify::parse_contacts(&raw))
            .unwrap_or_default();
        notify::spawn_notifier(VoiceCallNotifier::new(config, contacts))
    });

    println!("   Huddle Signaling Relay");
    println!("   Binding to {}", bind_addr);
    println!("   Press Ctrl+C to stop\n");

    let registry = Arc::new(Registry::new());
    let gateway = Gateway::bind(&bind_addr, registry, notify_handle).await?;

    tokio::select! {
        result = gateway.run() => result,
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down");
            Ok(())
        }
    }
}
