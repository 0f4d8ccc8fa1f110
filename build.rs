use std::fs;
use std::path::Path;

#[allow(dead_code)]
#[path = "src/cli.rs"]
mod cli;

fn main() -> std::io::Result<()> {
    let out_dir = Path::new("man");
    if !out_dir.exists() {
        fs::create_dir_all(out_dir)?;
    }

    let cmd = cli::Args::build_command();
    let after_help = cmd.get_after_help().map(|s| s.to_string()).unwrap_or_default();

    let clean_help = if let Some(idx) = after_help.find("  banner") {
        format!("Detailed Command Information:\n\n{}", &after_help[idx..])
    } else {
        after_help
    };

    let man_cmd = clap::Command::new("cdist")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Push-mode host configuration engine")
        .after_help(clean_help);

    let man = clap_mangen::Man::new(man_cmd);
    let mut buffer: Vec<u8> = Default::default();
    man.render(&mut buffer)?;
    fs::write(out_dir.join("cdist.1"), buffer)?;

    println!("cargo:rerun-if-changed=src/cli.rs");

    Ok(())
}
