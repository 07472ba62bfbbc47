//! Status command - show whether the managed services are up.

use hearth_chat::ServiceStatus;

pub(crate) async fn run() -> miette::Result<()> {
    let config = super::load_config()?;
    let assistant = super::assistant(&config)?;
    let status = assistant.status().await;

    println!("Services:");
    print_service(&status.chat, &config.ollama_url);
    print_service(&status.image, &config.comfy_url());
    println!();
    println!("GPU holder: {}", status.holder);

    Ok(())
}

fn print_service(status: &ServiceStatus, endpoint: &str) {
    let reachable = if status.reachable { "up" } else { "down" };
    println!(
        "  {:<8} {:<5} {:<13} {}",
        status.name,
        reachable,
        status.state.to_string(),
        endpoint
    );
}
