use aws_config::{BehaviorVersion, Region};
use claude_vision::{
    BedrockRuntime, ClaudeVisionModel, ClaudeVisionOptions, Completion, DEFAULT_MODEL_ID,
};
use clap::Parser;
use dotenvy::dotenv;
use futures::StreamExt;
use std::{
    error::Error,
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Describe an image with Anthropic Claude 3 on Amazon Bedrock.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Image to send to the model.
    #[arg(short, long, default_value = "image.jpg")]
    image: PathBuf,

    /// Prompt sent alongside the image.
    #[arg(short, long, default_value = "Describe this image in detail.")]
    prompt: String,

    /// Bedrock model identifier.
    #[arg(short, long, default_value = DEFAULT_MODEL_ID)]
    model_id: String,

    /// AWS region. Falls back to the SDK's region chain when unset.
    #[arg(short, long)]
    region: Option<String>,

    #[arg(long)]
    max_tokens: Option<u32>,

    #[arg(long)]
    temperature: Option<f64>,

    /// Print the completion as it is generated.
    #[arg(long, default_value_t = false)]
    stream: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = args.region.clone() {
        loader = loader.region(Region::new(region));
    }
    let sdk_config = loader.load().await;

    let model = ClaudeVisionModel::new(
        args.model_id.clone(),
        Arc::new(BedrockRuntime::from_sdk_config(&sdk_config)),
        ClaudeVisionOptions {
            max_tokens: args.max_tokens,
            temperature: args.temperature,
            ..Default::default()
        },
    );

    info!(model_id = %args.model_id, image = %args.image.display(), "invoking model");

    if args.stream {
        if let Completion::Done(mut stream) = model
            .stream_multi_modal_prompt(&args.prompt, &args.image)
            .await?
        {
            let mut stdout = io::stdout().lock();
            while let Some(delta) = stream.next().await {
                stdout.write_all(delta?.as_bytes())?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
        return Ok(());
    }

    // On access denied the model has already logged the warning to stderr.
    if let Some(text) = model
        .run_multi_modal_prompt(&args.prompt, &args.image)
        .await?
    {
        println!("{text}");
    }

    Ok(())
}
