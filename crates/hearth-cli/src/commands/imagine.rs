//! Imagine command - run one image generation.

use hearth_chat::UserId;
use tokio_util::sync::CancellationToken;

pub(crate) async fn run(prompt: &str, user: &str) -> miette::Result<()> {
    let config = super::load_config()?;
    let assistant = super::assistant(&config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, restoring services...");
            on_interrupt.cancel();
        }
    });

    println!(
        "Generating: {} (watching {})",
        prompt,
        assistant.images().output_dir().display()
    );
    let run = assistant
        .imagine(&UserId::from(user), prompt, &cancel)
        .await;

    for warning in &run.warnings {
        eprintln!("warning: {}", warning);
    }
    tracing::debug!("Stages: {:?}", run.trail);

    match run.outcome {
        Ok(path) => {
            println!("{}", path.display());
            Ok(())
        }
        Err(e) => Err(miette::miette!("Image generation failed: {}", e)),
    }
}
