use retirement_advisor::{config::AdvisorConfig, session::SessionManager};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Logs go to stderr so they don't interleave with the conversation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = AdvisorConfig::from_env()?;
    let manager = SessionManager::from_env(config)?;

    let greeting = manager.create_session().await;
    let session_id = greeting.session_id;
    info!(%session_id, "Terminal session started");

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(
            format!(
                "Retirement advisor. Type \"quit\" to leave, \"/profile\" or \"/history\" to inspect.\n\n{}\n\n> ",
                greeting.message
            )
            .as_bytes(),
        )
        .await?;
    stdout.flush().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let output = match line {
            "" => String::new(),
            "quit" | "exit" => break,
            "/profile" => serde_json::to_string_pretty(&manager.snapshot(session_id).await?)?,
            "/history" => {
                let history = manager.history(session_id).await?;
                history
                    .iter()
                    .map(|r| {
                        format!(
                            "{}  {:<18} {}",
                            r.created_at.format("%H:%M:%S"),
                            r.calculation_type.to_string(),
                            r.id
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            text => manager.handle_message(session_id, text).await?.message,
        };

        stdout.write_all(format!("{}\n\n> ", output).as_bytes()).await?;
        stdout.flush().await?;
    }

    Ok(())
}
