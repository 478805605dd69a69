//! Subscribe to Cumulocity notifications and print their payloads.
//!
//! ```sh
//! C8Y_BASEURL=https://example.cumulocity.com C8Y_USER=... C8Y_PASSWORD=... \
//!     cargo run -p c8y-notification --example subscribe -- <NAME> [EVENT_TYPE] [DEVICE_ID]
//! ```
//!
//! Or read the provider from a YAML file:
//! ```sh
//! C8Y_CONFIG=c8y.yaml cargo run -p c8y-notification --example subscribe -- <NAME> alarms 16412
//! ```
//!
//! `EVENT_TYPE` is one of `all`, `alarms`, `events`, `measurements`,
//! `inventory`, `operations` (default `all`). Omitting `DEVICE_ID` subscribes
//! to all devices. Payloads are printed to stdout (pipe to `jq` for
//! formatting). Ctrl-C deletes the subscription and closes the stream.

use std::path::PathBuf;

use c8y_notification::{
    ALL_DEVICES, BoxError, EventType, NotificationClient, NotificationFrame, ProviderConfig, config,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let usage = "usage: subscribe <NAME> [EVENT_TYPE] [DEVICE_ID]";
    let name = args.first().ok_or(usage)?;
    let event_type: EventType = args.get(1).map_or(Ok(EventType::All), |s| s.parse())?;
    let device = args.get(2).map_or(ALL_DEVICES, String::as_str);

    let provider = match std::env::var_os("C8Y_CONFIG") {
        Some(path) => config::load(&PathBuf::from(path)).await?,
        None => ProviderConfig::from_env()?,
    };
    let client = NotificationClient::new(provider)?;

    eprintln!("subscribing '{name}' to {event_type} on device {device} ...");
    let subscription = client
        .subscription(name.as_str())
        .with_device(device)
        .with_event_type(event_type)
        .initialize(&client)
        .await?;

    let mut session = client.session(subscription);
    session
        .open(|frame: &NotificationFrame| -> Result<(), BoxError> {
            eprintln!(
                "[notification] api={} action={}",
                frame.api().unwrap_or("-"),
                frame.action().unwrap_or("-"),
            );
            println!("{}", frame.payload);
            Ok(())
        })
        .await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            eprintln!("[shutdown] unsubscribing");
            session.unsubscribe().await?;
            session.close(false).await;
        }
        _ = session.closed() => eprintln!("[closed]"),
    }

    Ok(())
}
