use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use meiga_config::RobotConfig;

const LINKER_SCRIPT: &str = "memory.x";
const DEFAULT_JSON: &str = "meiga.json";

/// Place the linker script in OUT_DIR so `-Tlink.x` can find it
fn linker_script(out: &Path) -> Result<()> {
    std::fs::write(out.join(LINKER_SCRIPT), include_bytes!("memory.x"))
        .with_context(|| format!("Writing {}", LINKER_SCRIPT))?;
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed={}", LINKER_SCRIPT);
    Ok(())
}

/// JSON file to generate the config from, if the `json-config` feature is on
fn json_source() -> Result<Option<PathBuf>> {
    println!("cargo:rerun-if-env-changed=MEIGA_JSON_CONFIG");
    let requested = env::var_os("MEIGA_JSON_CONFIG");
    if env::var_os("CARGO_FEATURE_JSON_CONFIG").is_none() {
        if requested.is_some() {
            println!("cargo:warning=MEIGA_JSON_CONFIG ignored without feature \"json-config\"");
        }
        return Ok(None);
    }
    let path = requested.map(PathBuf::from).unwrap_or_else(|| DEFAULT_JSON.into());
    println!("cargo:rerun-if-changed={}", path.display());
    Ok(Some(path))
}

fn robot_config(out: &Path) -> Result<()> {
    RobotConfig::schema_to_file(&out.join("schema.json"))
        .context("Generating config schema")?;

    // Reported at start-up so a flashed board tells which config it runs
    let source = match json_source()? {
        Some(path) => {
            let config = RobotConfig::from_file(&path)
                .with_context(|| format!("Loading {}", path.display()))?;
            config.to_file(&out.join("config.rs"))
                .context("Generating config.rs")?;
            path.display().to_string()
        },
        None => String::from("built-in"),
    };
    println!("cargo:rustc-env=MEIGA_CONFIG_SOURCE={}", source);
    Ok(())
}

fn main() -> Result<()> {
    let out = PathBuf::from(env::var_os("OUT_DIR").context("OUT_DIR not set")?);
    built::write_built_file().context("Writing build metadata")?;
    linker_script(&out)?;
    robot_config(&out)
}
