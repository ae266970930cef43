use std::sync::Arc;

use bot_relay::prelude::*;
use bot_relay::vendors::poe::{self, PoeAdapter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), RelayError> {
    init_observability();
    let relay = Relay::builder()
        .register_upstream(Arc::new(PoeAdapter::from_env()?))
        .build()?;

    let mut exchange = relay
        .open(
            &poe::upstream_id(),
            InboundRequest::new("Assistant", "Stream a short greeting."),
        )
        .await?;

    let mut printed = 0;
    while let Some(event) = exchange.next_event().await {
        match event.status {
            Status::Incomplete | Status::Complete => {
                // content is cumulative; print only the new tail
                if let Some(tail) = event.content.get(printed..) {
                    print!("{tail}");
                }
                printed = event.content.len();
                if event.status == Status::Complete {
                    println!();
                }
            }
            Status::Error => eprintln!(
                "exchange error: {}",
                event.status_text.unwrap_or_default()
            ),
        }
    }
    Ok(())
}
