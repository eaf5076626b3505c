use std::sync::Arc;

use anyhow::Context;
use tokio::time::{Duration, sleep};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pacer_core::mail::{ConfirmationCodeKind, LogTransport, Mailer, MailTransport};
use pacer_core::{Dispatcher, DispatcherConfig};

const DEMO_RECIPIENTS: &[&str] = &[
    "alice@example.com",
    "bob@example.com",
    "carol@example.com",
];

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pacer_cli=debug,pacer_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // (A) 設定を読み込み、dispatcher を 1 つだけ作る（グローバルにはしない）
    let config = DispatcherConfig::load().context("loading dispatcher configuration")?;
    let pacing = config.pacing()?;
    info!(?config, "configuration loaded");

    let dispatcher = Arc::new(Dispatcher::from_config(&config));

    // (B) worker を起動
    let worker = tokio::spawn({
        let d = Arc::clone(&dispatcher);
        async move { d.run_with(pacing).await }
    });
    while !dispatcher.is_running() {
        sleep(Duration::from_millis(1)).await;
    }

    // (C) mailer に dispatcher を渡して送信依頼
    let transport: Arc<dyn MailTransport> = Arc::new(LogTransport);
    let mailer = Mailer::new(
        Arc::clone(&dispatcher),
        transport,
        "noreply@example.com",
        "https://example.com",
    );
    for (i, to) in DEMO_RECIPIENTS.iter().enumerate() {
        let code = format!("{:05}", 10_000 + i);
        mailer.send_confirmation_code(to, &code, ConfirmationCodeKind::Registration)?;
    }
    mailer.send_email_low_priority(
        DEMO_RECIPIENTS[0],
        "Weekly digest",
        "<p>Nothing new.</p>".into(),
    )?;

    // (D) 受理された分が処理されるまで待つ（lane 満杯で捨てた分は待たない、ctrl-c で中断）
    tokio::select! {
        _ = async {
            while !dispatcher.stats().is_drained() {
                sleep(Duration::from_millis(50)).await;
            }
        } => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    println!("{}", serde_json::to_string_pretty(&dispatcher.stats())?);

    // (E) 停止して worker の終了を待つ
    dispatcher.stop();
    worker.await.context("dispatcher worker panicked")?;
    Ok(())
}
