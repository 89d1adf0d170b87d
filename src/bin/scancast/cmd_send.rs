use std::path::Path;

use anyhow::{Context, Result};
use scancast::{
    discover_broadcast, BroadcastSender, Config, Job, JobEvent, JobOutcome, StreamService,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::Cli;

pub async fn main(
    _cli: &Cli,
    cfg: &Config,
    file: Option<&Path>,
    from_artifacts: Option<&Path>,
    confirm: bool,
) -> Result<()> {
    let mut config = cfg.clone();
    if confirm {
        config.confirm_layers = true;
    }

    let job = match (file, from_artifacts) {
        (Some(file), None) => {
            let gcode = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            Job::new(gcode, config.clone())
        }
        (None, Some(dir)) => Job::from_artifacts(dir, config.clone()),
        _ => anyhow::bail!("pass a G-code file or --from-artifacts"),
    };

    let broadcast = match config.transport.target {
        Some(addr) => addr,
        None => discover_broadcast()
            .await
            .context("Failed to discover a broadcast address")?,
    };
    let sink = BroadcastSender::connect(broadcast, config.transport.port, config.transport.pacing())
        .await
        .context("Failed to open the broadcast socket")?;
    println!("streaming to {}", sink.target());

    let mut service = StreamService::new();
    let handle = service.spawn(job, sink)?;
    let cancel = handle.cancel_token();

    loop {
        tokio::select! {
            event = handle.next_event() => {
                match event {
                    Some(JobEvent::LayerSent {
                        sequence,
                        total,
                        layer,
                        frames_sent,
                        frames_skipped,
                        clamped,
                    }) => {
                        let mut line = format!(
                            "layer {} ({}/{}): {} frames sent",
                            layer, sequence, total, frames_sent
                        );
                        if frames_skipped > 0 {
                            line.push_str(&format!(", {} skipped", frames_skipped));
                        }
                        if clamped > 0 {
                            line.push_str(&format!(", {} coordinates clamped", clamped));
                        }
                        println!("{}", line);
                    }
                    Some(JobEvent::AwaitingConfirmation { sequence, total, frames_sent }) => {
                        println!("sent {} frames of layer {}/{}", frames_sent, sequence, total);
                        if ask_continue().await? {
                            handle.confirm();
                        } else {
                            handle.cancel();
                        }
                    }
                    Some(JobEvent::Finished { .. })
                    | Some(JobEvent::Cancelled)
                    | Some(JobEvent::Failed { .. })
                    | None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("cancelling, finishing the frame in flight...");
                cancel.cancel();
            }
        }
    }

    let Some(handle) = service.take() else {
        anyhow::bail!("the job handle vanished");
    };
    match handle.wait().await {
        JobOutcome::Finished { layers } => {
            println!("finished: {} layers sent", layers);
            Ok(())
        }
        JobOutcome::Cancelled => {
            println!("cancelled: frames already sent are not retracted");
            Ok(())
        }
        JobOutcome::Failed(err) => Err(err.into()),
    }
}

/// Prompt on stdin. A bare newline continues; n declines and cancels.
async fn ask_continue() -> Result<bool> {
    use std::io::Write;

    print!("continue with the next layer? [Y/n] ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(!matches!(line.trim(), "n" | "N" | "no"))
}
