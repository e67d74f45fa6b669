//! Shell helper installation.

use std::io::Write;

use anyhow::{bail, Context as _};

const FUNCTION: &str = r#"
# tracker shell integration
# t <plan-id>: cd into the plan's working directory (worktree or project).
# Anything else is passed through to tracker itself.
t() {
  if [ $# -eq 1 ] && [ "$1" -eq "$1" ] 2>/dev/null; then
    local dir
    dir="$(tracker checkout "$1" --path-only)" || return 1
    cd "$dir" || return 1
  else
    tracker "$@"
  fi
}
"#;

/// Print the helper, or append it to the shell rc file with `--auto`.
pub fn install(auto: bool, bash: bool, zsh: bool) -> anyhow::Result<()> {
    if !auto {
        print!("{FUNCTION}");
        return Ok(());
    }

    let rc_name = match (bash, zsh) {
        (true, false) => ".bashrc",
        (false, true) => ".zshrc",
        (false, false) => match std::env::var("SHELL").unwrap_or_default() {
            shell if shell.ends_with("zsh") => ".zshrc",
            _ => ".bashrc",
        },
        (true, true) => bail!("pass at most one of --bash and --zsh"),
    };

    let home = dirs::home_dir().context("could not determine home directory")?;
    let rc_path = home.join(rc_name);

    let existing = std::fs::read_to_string(&rc_path).unwrap_or_default();
    if existing.contains("tracker shell integration") {
        println!("already installed in {}", rc_path.display());
        return Ok(());
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&rc_path)
        .with_context(|| format!("opening {}", rc_path.display()))?;
    file.write_all(FUNCTION.as_bytes())?;
    println!("installed t() in {}", rc_path.display());
    Ok(())
}
