use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use medintake_lib::config;
use medintake_lib::pipeline::extraction::openai::{OpenAiClient, OpenAiConfig};
use medintake_lib::pipeline::extraction::pdfium::PdfiumRenderer;
use medintake_lib::{DocumentProcessor, PipelineConfig};

#[tokio::main]
async fn main() -> ExitCode {
    medintake_lib::init_tracing();

    let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("usage: {} <document.pdf|image>", config::APP_NAME);
        return ExitCode::from(2);
    };

    match run(path).await {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("{}: {message}", config::APP_NAME);
            ExitCode::FAILURE
        }
    }
}

async fn run(path: PathBuf) -> Result<String, String> {
    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let client = OpenAiConfig::from_env()
        .and_then(OpenAiClient::new)
        .map_err(|e| e.to_string())?;
    let renderer = PdfiumRenderer::new().map_err(|e| e.to_string())?;

    let processor = DocumentProcessor::new(
        Arc::new(renderer),
        Arc::new(client),
        PipelineConfig::from_env(),
    );

    let record = processor.process(&bytes, &filename).await;
    serde_json::to_string_pretty(&record).map_err(|e| e.to_string())
}
