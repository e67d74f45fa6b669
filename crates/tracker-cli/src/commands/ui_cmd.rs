//! Dashboard server command.

use tracker_ui::AppState;

use super::Context;

const DEFAULT_PORT: u16 = 4040;

pub async fn serve(ctx: Context, port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or(DEFAULT_PORT);
    let tracker_exe = std::env::current_exe()?;

    println!("dashboard: http://127.0.0.1:{port}/");
    let state = AppState::new(
        ctx.db,
        ctx.config,
        ctx.logs_dir,
        ctx.plans_dir,
        tracker_exe,
    );
    tracker_ui::serve(state, port).await?;
    Ok(())
}
