//! Dependency edge commands.

use super::{plan_line, Context};

pub async fn set(ctx: &Context, id: i64, dep_id: Option<i64>) -> anyhow::Result<()> {
    ctx.db.set_dependency(id, dep_id).await?;
    match dep_id {
        Some(dep) => println!("plan #{id} now depends on #{dep}"),
        None => println!("cleared dependency of plan #{id}"),
    }
    Ok(())
}

pub async fn show(ctx: &Context, id: i64) -> anyhow::Result<()> {
    let chain = ctx.db.get_dependency_chain(id).await?;
    println!("dependency chain (root first):");
    for (index, plan) in chain.iter().enumerate() {
        let marker = if plan.id == id { " <- this plan" } else { "" };
        println!("  {}{}{}", "  ".repeat(index), plan_line(plan), marker);
    }

    let dependents = ctx.db.get_dependents(id).await?;
    if dependents.is_empty() {
        println!("no plans depend on #{id}");
    } else {
        println!("depended on by:");
        for plan in &dependents {
            println!("  {}", plan_line(plan));
        }
    }
    Ok(())
}
