//! Stop command - stop a managed service.

use hearth_chat::ServiceKind;

pub(crate) async fn run(kind: ServiceKind) -> miette::Result<()> {
    let config = super::load_config()?;
    let assistant = super::assistant(&config)?;

    let outcome = assistant
        .stop(kind)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    if outcome.nothing_found() {
        println!("Nothing to stop.");
        return Ok(());
    }

    for process in &outcome.stopped {
        let pid = process
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string());
        if process.forced {
            println!("Killed process {} after the grace period", pid);
        } else {
            println!("Stopped process {}", pid);
        }
    }

    Ok(())
}
