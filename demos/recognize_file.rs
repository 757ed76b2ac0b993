//! Recognise a raw 16 kHz 16-bit mono PCM file - run with:
//! cargo run --example recognize_file -- path/to/audio.pcm [stream|sentence]
//!
//! Credentials come from config.toml next to the binary or from the
//! TENCENTCLOUD_* environment variables.

use tencent_asr_client::logging::init_tracing;
use tencent_asr_client::{AppConfig, AsrClient};

#[tokio::main]
async fn main() {
    init_tracing("tencent_asr_client=info");

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: recognize_file <audio.pcm> [stream|sentence]");
        std::process::exit(2);
    };
    let mode = args.next().unwrap_or_else(|| "stream".to_string());

    let audio = match std::fs::read(&path) {
        Ok(audio) => audio,
        Err(e) => {
            eprintln!("[ERROR] Cannot read {}: {}", path, e);
            std::process::exit(1);
        }
    };
    println!("[Audio] {} bytes from {}", audio.len(), path);

    let client = match AppConfig::resolve(&AppConfig::config_path()).and_then(|c| AsrClient::new(&c)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("[ERROR] {}", e);
            std::process::exit(1);
        }
    };
    let options = client.default_options().clone();

    match mode.as_str() {
        "sentence" => match client.recognize_sentence(&audio, &options).await {
            Ok(result) => {
                println!("[Result] {}", result.text);
                println!("[Duration] {} ms (request {})", result.audio_duration_ms, result.request_id);
            }
            Err(e) => eprintln!("[ERROR] {}", e),
        },
        _ => match client.recognize_stream(&audio, &options).await {
            Ok(result) => {
                println!("[Result] {}", result.text);
                println!("[Duration] ~{} s", result.estimated_audio_duration_seconds);
            }
            Err(e) => {
                eprintln!("[ERROR] {}", e);
                if let Some(partial) = e.partial {
                    println!("[Partial] {}", partial.text);
                }
            }
        },
    }
}
