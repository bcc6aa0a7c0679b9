use anyhow::{Context, Result};
use mxnet_image_builder::layout::PathLayout;
use mxnet_image_builder::preflight;
use mxnet_image_builder::report::{
    now_utc_compact, write_report, BuildReport, RequestSummary, StepRecord,
};
use mxnet_image_builder::{BuildOutcome, ImageBuilder};
use tracing::warn;

use crate::workflows::{resolve_invocation, Invocation};
use crate::Cli;

pub(crate) fn run(cli: Cli) -> Result<()> {
    let invocation = resolve_invocation(cli)?;
    let builder =
        ImageBuilder::with_system_runner(&invocation.main_dir, invocation.config.clone());

    if invocation.dry_run {
        let plan = builder
            .plan(&invocation.request)
            .context("planning image build")?;
        for line in plan.describe() {
            println!("{line}");
        }
        return Ok(());
    }

    let layout = PathLayout::resolve(
        &invocation.main_dir,
        &invocation.request.framework_version,
        &invocation.request.python,
    );
    if !invocation.skip_preflight {
        preflight::check_build(
            &invocation.main_dir,
            &layout,
            &invocation.request,
            &invocation.config,
        )?;
    }

    let started_at_utc = now_utc_compact();
    let mut steps = Vec::new();
    let build_result = builder.build_recorded(&invocation.request, &mut steps);

    if let Some(report_path) = &invocation.config.report {
        let report = assemble_report(&invocation, layout, started_at_utc, steps, &build_result);
        let write_result = write_report(report_path, &report);
        match (write_result, &build_result) {
            (Err(err), Ok(_)) => {
                return Err(err).with_context(|| {
                    format!("writing build report '{}'", report_path.display())
                })
            }
            (Err(err), Err(_)) => {
                warn!(path = %report_path.display(), "failed to write build report: {err:#}");
            }
            (Ok(()), _) => {}
        }
    }

    let outcome = build_result.with_context(|| {
        format!(
            "building {} image for MXNet {}",
            invocation.request.processor, invocation.request.framework_version
        )
    })?;
    for image in &outcome.images {
        println!("{image}");
    }
    Ok(())
}

fn assemble_report(
    invocation: &Invocation,
    layout: PathLayout,
    started_at_utc: String,
    steps: Vec<StepRecord>,
    result: &mxnet_image_builder::Result<BuildOutcome>,
) -> BuildReport {
    let (status, error, base_image, images, binary, archive) = match result {
        Ok(outcome) => (
            "success",
            None,
            outcome.base_image.clone(),
            outcome.images.clone(),
            Some(outcome.binary.clone()),
            Some(outcome.archive.clone()),
        ),
        Err(err) => ("failed", Some(err.to_string()), None, Vec::new(), None, None),
    };
    BuildReport {
        status: status.to_string(),
        error,
        failure_policy: invocation.config.failure_policy,
        started_at_utc,
        finished_at_utc: now_utc_compact(),
        request: RequestSummary::from(&invocation.request),
        layout,
        steps,
        base_image,
        images,
        binary,
        archive,
    }
}
