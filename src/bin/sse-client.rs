//! sse-client: post one question to the chat endpoint with streaming on and
//! print every SSE event until the stream ends or Ctrl-C is pressed.

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::json;

use ai_agent::sse::{SseFrame, SseParser};

const DEFAULT_URL: &str = "http://localhost:8800/api/chat";
const DEFAULT_QUESTION: &str = "Tell me a joke";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let args = parse_cli_args();

    println!("connecting to {} ...", args.url);
    let response = reqwest::Client::new()
        .post(&args.url)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "text/event-stream")
        .json(&json!({ "question": args.question, "stream": true }))
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("unexpected status {status}: {body}"));
    }
    println!("connected, receiving events");

    let mut parser = SseParser::new();
    let mut body = response.bytes_stream();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\ninterrupted, exiting");
                return Ok(());
            }
            chunk = body.next() => match chunk {
                Some(Ok(bytes)) => parser.feed_bytes(&bytes).iter().for_each(print_frame),
                Some(Err(e)) => return Err(format!("stream read failed: {e}")),
                None => break,
            },
        }
    }

    if let Some(frame) = parser.finish() {
        print_frame(&frame);
    }
    println!("stream finished");
    Ok(())
}

fn print_frame(frame: &SseFrame) {
    println!("event:");
    println!("  id:   {}", frame.id.as_deref().unwrap_or(""));
    println!("  type: {}", frame.event_type());
    println!("  data: {}\n", frame.data);
}

struct CliArgs {
    url: String,
    question: String,
}

fn parse_cli_args() -> CliArgs {
    let mut url = DEFAULT_URL.to_string();
    let mut question = DEFAULT_QUESTION.to_string();

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: sse-client [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  --url <URL>                Chat endpoint (default: {DEFAULT_URL})");
                println!("  --question <TEXT>          Question to ask (default: \"{DEFAULT_QUESTION}\")");
                std::process::exit(0);
            }
            "--url" | "--question" => {
                let Some(value) = iter.next() else {
                    eprintln!("error: {arg} requires a value");
                    std::process::exit(1);
                };
                if arg == "--url" {
                    url = value;
                } else {
                    question = value;
                }
            }
            _ => {}
        }
    }

    CliArgs { url, question }
}
