use std::error::Error;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{self, AsyncBufReadExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Minimal interactive client for poking at a relay room:
/// `signal_cli <room> [host:port]`
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let room = args.next().unwrap_or_else(|| "lobby".to_string());
    let host = args.next().unwrap_or_else(|| "127.0.0.1:8000".to_string());
    let url = format!("ws://{}/ws/{}", host, room);

    println!("Connecting to {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // Task: print everything the relay sends us
    tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if let Message::Text(text) = msg {
                println!("< {}", text.as_str());
            }
        }
        println!("Connection closed by relay");
    });

    println!("Type a message and press Enter ('@<client_id> text' for unicast):");

    let mut stdin = io::BufReader::new(io::stdin()).lines();
    while let Ok(Some(line)) = stdin.next_line().await {
        let frame = match line.strip_prefix('@') {
            Some(rest) => {
                let (to, text) = rest.split_once(' ').unwrap_or((rest, ""));
                serde_json::json!({"type": "chat", "to": to, "text": text})
            }
            None => serde_json::json!({"type": "chat", "text": line}),
        };
        ws_tx.send(Message::Text(frame.to_string().into())).await?;
    }

    Ok(())
}
