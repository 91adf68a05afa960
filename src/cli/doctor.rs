//! Read-only diagnostics for key state and rotation readiness.

use crate::cli::CliContext;
use crate::constants;
use crate::core::key_material;
use crate::core::rotation_journal::RotationJournal;
use crate::models::key_pair::KeyPair;
use crate::models::trust::HostTrustPolicy;
use crate::remote::discovery;
use crate::util::fs as warden_fs;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Skip the TCP probe of the rotation server
    #[arg(long)]
    pub offline: bool,
}

#[derive(Default)]
struct Tally {
    pass: u32,
    warn: u32,
    fail: u32,
}

impl Tally {
    fn pass(&mut self, msg: impl AsRef<str>) {
        println!("  [PASS] {}", msg.as_ref());
        self.pass += 1;
    }

    fn warn(&mut self, msg: impl AsRef<str>) {
        println!("  [WARN] {}", msg.as_ref());
        self.warn += 1;
    }

    fn fail(&mut self, msg: impl AsRef<str>) {
        println!("  [FAIL] {}", msg.as_ref());
        self.fail += 1;
    }
}

pub fn run(ctx: &CliContext, args: DoctorArgs) -> Result<()> {
    let mut t = Tally::default();
    println!("Doctor: {}", ctx.paths);

    match &ctx.config_load_error {
        Some(e) => t.fail(e),
        None if ctx.store.exists() => {
            t.pass(format!("configuration: {}", ctx.store.path().display()))
        }
        None => t.warn(format!(
            "no configuration at {} (run `client` first)",
            ctx.store.path().display()
        )),
    }

    match HostTrustPolicy::from_settings(ctx.trusted_host_key.as_deref(), ctx.trust_on_first_use) {
        Ok(HostTrustPolicy::Pinned(key)) => t.pass(format!("host key pinned: {}", key)),
        Ok(HostTrustPolicy::TrustOnFirstUse) => {
            t.warn("trust-on-first-use enabled; any host key is accepted")
        }
        Err(_) => t.fail(
            "no trusted host key; remote commands will refuse to connect (see `trust scan`)",
        ),
    }

    let rotate = &ctx.config.rotate;
    if let (Some(dir), Some(name)) = (&rotate.key_directory, &rotate.key_name) {
        if dir.is_dir() {
            t.pass(format!("key directory: {}", dir.display()));
        } else {
            t.fail(format!("key directory missing: {}", dir.display()));
        }
        check_key(&mut t, &KeyPair::locate(dir, name, ""));

        let journal = RotationJournal::path_for(dir, name);
        match RotationJournal::load(&journal) {
            Ok(None) => t.pass("no interrupted rotation"),
            Ok(Some(j)) => t.fail(format!(
                "interrupted rotation in state {} since {} (run `rotate --resume`)",
                j.state,
                j.started_at.format("%Y-%m-%d %H:%M:%S")
            )),
            Err(e) => t.fail(format!("unreadable rotation journal: {}", e)),
        }
    } else if !rotate.missing_fields().is_empty() {
        t.warn(format!("[rotate] incomplete: missing {:?}", rotate.missing_fields()));
    }

    if !args.offline {
        match (&rotate.server_name, rotate.server_port) {
            (Some(host), port) => {
                let port = port.unwrap_or(constants::DEFAULT_SSH_PORT);
                if discovery::discover_remote(host, port) {
                    t.pass(format!("{}:{} reachable", host, port));
                } else {
                    t.fail(format!("{}:{} unreachable", host, port));
                }
            }
            (None, _) => t.warn("no rotate.server_name to probe"),
        }
    }

    println!();
    println!("Doctor summary: {} pass, {} warn, {} fail", t.pass, t.warn, t.fail);
    if t.fail > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn check_key(t: &mut Tally, pair: &KeyPair) {
    let private = &pair.private_key_path;
    if !private.is_file() {
        t.fail(format!("private key missing: {}", private.display()));
        return;
    }
    match warden_fs::mode_of(private) {
        Ok(mode) if mode == constants::PRIVATE_KEY_MODE => {
            t.pass(format!("private key {} mode {:04o}", private.display(), mode))
        }
        Ok(mode) => t.warn(format!(
            "private key {} mode {:04o} (expected {:04o})",
            private.display(),
            mode,
            constants::PRIVATE_KEY_MODE
        )),
        Err(e) => t.warn(format!("cannot stat {}: {}", private.display(), e)),
    }
    match key_material::read_public_key(pair).and_then(|line| key_material::key_identity(&line)) {
        Ok(_) => t.pass(format!("public key readable: {}", pair.public_key_path.display())),
        Err(e) => t.fail(format!("public key {}: {}", pair.public_key_path.display(), e)),
    }
}
