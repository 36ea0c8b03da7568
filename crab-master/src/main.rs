use crab_master::{
    Bootstrap, Config, Control, RemoteListener, RunOutcome, Scheduler, ShutdownOutcome,
    init_logger, install_panic_hook,
};
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // 1. 环境变量
    dotenv::dotenv().ok();
    let mut config = Config::from_env();

    // 2. 启动握手 (由启动器提供 socket 时)
    let mut bootstrap = None;
    if let Some(socket) = config.bootstrap_socket.clone() {
        match Bootstrap::connect(&socket).await {
            Ok(mut b) => match b.read_options().await {
                Ok(opts) => {
                    config.apply_bootstrap(&opts);
                    bootstrap = Some(b);
                }
                Err(e) => {
                    eprintln!("bootstrap handshake failed: {}", e);
                    return ExitCode::FAILURE;
                }
            },
            Err(e) => {
                eprintln!("bootstrap socket unavailable: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    // 3. 日志
    if let Err(e) = init_logger(&config.log_level, config.notrace, config.log_dir.as_deref()) {
        eprintln!("failed to initialize logging: {}", e);
    }
    install_panic_hook();

    tracing::info!(data = %config.data_path.display(), "Crab master starting");

    // 4. 启动系统
    let ctl = match Control::start(config) {
        Ok(ctl) => ctl,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            if let Some(b) = bootstrap
                && let Err(err) = b.abort(&e.to_string()).await
            {
                tracing::warn!(error = %err, "Failed to report abort to launcher");
            }
            return ExitCode::FAILURE;
        }
    };

    let listener = match RemoteListener::bind(&ctl.config).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "Cannot open remote port");
            let mut ctl = ctl;
            ctl.shutdown("remote port unavailable").await;
            if let Some(b) = bootstrap
                && let Err(err) = b.abort(&e.to_string()).await
            {
                tracing::warn!(error = %err, "Failed to report abort to launcher");
            }
            return ExitCode::FAILURE;
        }
    };

    if let Some(b) = bootstrap
        && let Err(e) = b.signal_ready().await
    {
        tracing::warn!(error = %e, "Failed to signal readiness");
    }

    // 5. 调度循环
    let mut scheduler = Scheduler::new(ctl, listener);
    match scheduler.run().await {
        Ok(RunOutcome::Shutdown(ShutdownOutcome::Clean)) | Ok(RunOutcome::Restart) => {
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Interrupted) => ExitCode::from(130),
        Ok(outcome) => {
            tracing::error!(outcome = ?outcome, "Exited without clean shutdown");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "Scheduler error");
            ExitCode::FAILURE
        }
    }
}
