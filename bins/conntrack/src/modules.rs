//! Kernel module precondition check.
//!
//! The conntrack dump needs `nf_conntrack` and `nf_conntrack_netlink`. A
//! module counts as loaded when one of its symbols shows up in
//! `/proc/kallsyms`; otherwise it is loaded with `modprobe`.

use anyhow::{Context, bail};
use tokio::process::Command;
use tracing::{info, warn};

const KALLSYMS: &str = "/proc/kallsyms";

/// Kernel modules the dump depends on, with a symbol each exports.
pub const REQUIRED: &[KernelModule] = &[
    KernelModule {
        name: "nf_conntrack",
        symbol: "nf_ct_attach",
    },
    KernelModule {
        name: "nf_conntrack_netlink",
        symbol: "ctnetlink_net_init",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelModule {
    pub name: &'static str,
    pub symbol: &'static str,
}

/// Whether `symbol` appears in a kallsyms listing.
///
/// Lines look like `ffffffffc0a01230 t nf_ct_attach\t[nf_conntrack]`.
pub fn symbol_present(kallsyms: &str, symbol: &str) -> bool {
    kallsyms
        .lines()
        .any(|line| line.split_whitespace().nth(2) == Some(symbol))
}

/// Make sure every required module is loaded.
///
/// An unreadable kallsyms skips the check: the dump itself reports a
/// missing module as an unavailable transport.
pub async fn ensure_loaded() -> anyhow::Result<()> {
    let kallsyms = match tokio::fs::read_to_string(KALLSYMS).await {
        Ok(contents) => contents,
        Err(e) => {
            warn!(error = %e, "cannot read {KALLSYMS}, skipping kernel module check");
            return Ok(());
        }
    };

    for module in REQUIRED {
        if symbol_present(&kallsyms, module.symbol) {
            info!(
                module = module.name,
                symbol = module.symbol,
                "kernel module is loaded"
            );
            continue;
        }
        info!(module = module.name, "loading kernel module");
        modprobe(module.name).await?;
    }

    Ok(())
}

async fn modprobe(name: &str) -> anyhow::Result<()> {
    let status = Command::new("modprobe")
        .arg(name)
        .status()
        .await
        .context("modprobe error")?;

    if !status.success() {
        // Killed by a signal when there is no exit code.
        bail!("modprobe error (exit code {})", status.code().unwrap_or(-1));
    }
    Ok(())
}
