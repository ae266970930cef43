use bot_relay::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), DispatchError> {
    init_observability();
    let proxy_url = std::env::var("BOT_RELAY_PROXY_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:3000/api/poe-proxy".to_string());

    let mut dispatcher = Dispatcher::new(DispatchConfig::new(proxy_url))?;
    dispatcher.register_handler("print", |event: &ProgressEvent, label: &String| {
        println!("[{label}] {} ({} chars)", event.status, event.content.len());
        if event.is_terminal() {
            println!("{}", event.content);
        }
    });

    let outcome = dispatcher
        .send_user_message(
            "@Assistant Say hello in three languages.",
            SendOptions::new("demo".to_string()).handler("print"),
        )
        .await?;
    println!("dispatched {} events", outcome.events_dispatched);
    Ok(())
}
