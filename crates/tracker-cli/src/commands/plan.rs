//! Plan document generation.

use tracker_engine::drafting;

use super::Context;

pub async fn generate(ctx: &Context, id: i64) -> anyhow::Result<()> {
    println!("drafting plan for task #{id}...");
    let plan = drafting::generate_plan(
        &ctx.db,
        &ctx.config,
        None,
        &ctx.plans_dir,
        &ctx.logs_dir,
        id,
    )
    .await?;
    println!("wrote {} (\"{}\")", plan.plan_path, plan.title);
    Ok(())
}
