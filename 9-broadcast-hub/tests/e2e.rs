use std::{process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use broadcast_hub::envelope::{Envelope, JOINED_NOTICE};
use futures::{SinkExt, Stream, StreamExt};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, ChildStdout, Command},
    time::timeout,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn binary_relays_between_two_clients() -> Result<()> {
    let (mut hub, mut stdout) = spawn_hub()?;
    let url = read_hub_url(&mut stdout).await?;

    // Drain additional hub logs in the background so the pipe never fills.
    let log_task = tokio::spawn(async move {
        drain_stdout(stdout).await;
    });

    let (mut alice, _) = connect_async(url.as_str()).await?;
    let (mut bob, _) = connect_async(url.as_str()).await?;

    // Whichever client registered first hears the other one join; once that
    // notice arrives, both are live and anything the first sends reaches the
    // second.
    let alice_first = tokio::select! {
        joined = read_envelope(&mut alice) => {
            assert_eq!(joined?, Envelope::notice(JOINED_NOTICE));
            true
        }
        joined = read_envelope(&mut bob) => {
            assert_eq!(joined?, Envelope::notice(JOINED_NOTICE));
            false
        }
    };
    let (mut speaker, mut listener) = if alice_first { (alice, bob) } else { (bob, alice) };

    speaker.send(Message::Text("Hello there".into())).await?;
    let heard = read_envelope(&mut listener)
        .await
        .context("waiting for the second client to hear the first")?;
    assert_eq!(heard.content.as_deref(), Some("Hello there"));
    assert!(heard.sender.is_some());

    speaker.close(None).await?;
    listener.close(None).await?;

    // The hub stays up after clients disconnect; terminate it manually.
    let _ = hub.kill().await;
    let _ = hub.wait().await;
    let _ = log_task.await;

    Ok(())
}

fn spawn_hub() -> Result<(Child, BufReader<ChildStdout>)> {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_broadcast-hub"));
    cmd.arg("--listen")
        .arg("127.0.0.1:0")
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to spawn hub")?;
    let stdout = child
        .stdout
        .take()
        .context("hub stdout missing after spawn")?;

    Ok((child, BufReader::new(stdout)))
}

async fn read_hub_url(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    loop {
        let mut line = String::new();
        let bytes = timeout(READ_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| anyhow!("timed out waiting for hub banner"))??;
        if bytes == 0 {
            return Err(anyhow!("hub exited before announcing its address"));
        }
        if let Some(url) = line.split_whitespace().find(|word| word.starts_with("ws://")) {
            return Ok(url.to_string());
        }
    }
}

async fn read_envelope<S>(socket: &mut S) -> Result<Envelope>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = timeout(READ_TIMEOUT, socket.next())
            .await
            .map_err(|_| anyhow!("timed out waiting for a frame"))?
            .ok_or_else(|| anyhow!("socket closed"))??;
        if let Message::Text(text) = frame {
            return Ok(Envelope::decode(&text)?);
        }
    }
}

async fn drain_stdout(mut reader: BufReader<ChildStdout>) {
    let mut buffer = String::new();
    while reader
        .read_line(&mut buffer)
        .await
        .map(|bytes| {
            let has_data = bytes > 0;
            if has_data {
                buffer.clear();
            }
            has_data
        })
        .unwrap_or(false)
    {}
}
