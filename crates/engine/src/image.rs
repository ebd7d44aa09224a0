// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Base-image builds via packer.

use std::path::{Path, PathBuf};

use clawbox_adapters::process::run_passthrough;

use crate::context::EngineContext;
use crate::error::UserFacingError;

fn packer_template(ctx: &EngineContext) -> PathBuf {
    ctx.data_root.join("packer").join("macos-base.pkr.hcl")
}

fn template_arg(ctx: &EngineContext) -> Result<String, UserFacingError> {
    let template = packer_template(ctx);
    if !template.exists() {
        return Err(UserFacingError::new(format!(
            "Error: Packer template not found: {}",
            template.display()
        )));
    }
    let arg = template
        .strip_prefix(&ctx.data_root)
        .map(Path::to_path_buf)
        .unwrap_or(template);
    Ok(arg.display().to_string())
}

fn run_packer(ctx: &EngineContext, args: Vec<String>) -> Result<(), UserFacingError> {
    let exit_code = run_passthrough("packer", &args, Some(&ctx.data_root)).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            UserFacingError::new("Error: Command not found: packer")
        } else {
            UserFacingError::new(format!("Error: Could not run packer: {e}"))
        }
    })?;
    if exit_code != 0 {
        return Err(UserFacingError::new(format!(
            "Error: Command failed with exit code {exit_code}: packer {}",
            args.join(" ")
        )));
    }
    Ok(())
}

pub fn image_init(ctx: &EngineContext) -> Result<(), UserFacingError> {
    let template = template_arg(ctx)?;
    println!("Initializing packer plugins for template: {template}");
    run_packer(ctx, vec!["init".to_string(), template])
}

pub fn image_build(ctx: &EngineContext, skip_init: bool, force: bool) -> Result<(), UserFacingError> {
    let template = template_arg(ctx)?;
    if !skip_init {
        image_init(ctx)?;
    }
    let mut args = vec!["build".to_string()];
    if force {
        args.push("-force".to_string());
    }
    args.push(template.clone());
    println!("Building base image from template: {template}");
    run_packer(ctx, args)
}
