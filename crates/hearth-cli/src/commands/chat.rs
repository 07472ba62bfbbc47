//! Chat command - line-oriented conversation over stdin.

use hearth_chat::UserId;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub(crate) async fn run(user: &str) -> miette::Result<()> {
    let config = super::load_config()?;
    let assistant = super::assistant(&config)?;
    let user = UserId::from(user);

    println!(
        "Chatting with {} as {}, keeping the last {} turns. /last repeats the last message, end input to quit.",
        config.model,
        user,
        assistant.history().window()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout
            .write_all(b"> ")
            .await
            .map_err(|e| miette::miette!("Failed to write prompt: {}", e))?;
        stdout
            .flush()
            .await
            .map_err(|e| miette::miette!("Failed to write prompt: {}", e))?;

        let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| miette::miette!("Failed to read input: {}", e))?
        else {
            break;
        };

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/last" {
            match assistant.history().last_text(&user) {
                Some(last) => println!("{}\n", last),
                None => println!("(nothing yet)\n"),
            }
            continue;
        }

        match assistant.handle_message(&user, text, None).await {
            Ok(reply) => println!("{}\n", reply),
            Err(e) => eprintln!("error: {}\n", e),
        }
    }

    println!();
    Ok(())
}
