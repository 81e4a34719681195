//! End-to-end pipeline tests against a scripted fixture project.
//!
//! External tools are stood in for by small shell scripts so the full stage
//! sequence, short-circuiting and cancellation can be exercised for real.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use loraforge::pipeline::{
    PipelineConfig, PipelineOrchestrator, Stage, StageStatus,
};

/// Builds a complete fixture project under a temp root: images, workflow,
/// configs, command files and a captioner script that writes the expected
/// caption files and dataset jsonl.
fn fixture_project() -> (TempDir, PipelineConfig) {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    fs::create_dir_all(root.join("dataset")).unwrap();
    fs::create_dir_all(root.join("input")).unwrap();
    fs::create_dir_all(root.join("output")).unwrap();
    fs::create_dir_all(root.join("comfyui-workflows")).unwrap();
    fs::create_dir_all(root.join("configs")).unwrap();
    fs::create_dir_all(root.join("commands")).unwrap();

    fs::write(root.join("dataset").join("1.png"), b"fake-png").unwrap();
    fs::write(root.join("dataset").join("2.jpg"), b"fake-jpg").unwrap();

    let workflow = json!({
        "nodes": [
            { "id": 1, "type": "LoadImageListFromDir //Inspire", "widgets_values": ["/old", 0] },
            { "id": 2, "type": "Image Save", "widgets_values": ["/old"] },
            { "id": 3, "type": "Save Text File", "widgets_values": ["/old", "[name]"] }
        ]
    });
    fs::write(
        root.join("comfyui-workflows").join("GenTextForImages.json"),
        serde_json::to_string_pretty(&workflow).unwrap(),
    )
    .unwrap();

    write_captioner_script(root, true);

    fs::write(
        root.join("configs").join("dataset.toml"),
        "resolution = [1024, 1024]\nimage_jsonl_file = \"placeholder\"\n",
    )
    .unwrap();
    fs::write(
        root.join("configs").join("trainer.toml"),
        "epochs = 16\ndataset_config = \"placeholder\"\ndit = \"placeholder\"\nvae = \"placeholder\"\ntext_encoder = \"placeholder\"\nimage_encoder = \"placeholder\"\n",
    )
    .unwrap();

    for name in [
        "cache_latents.args",
        "cache_text_encoder_outputs.args",
        "train_network.args",
    ] {
        fs::write(root.join("commands").join(name), "true\n").unwrap();
    }

    let config = PipelineConfig::for_root(root)
        .with_trigger_word("zed123")
        .with_stage_timeout(Duration::from_secs(30));
    (temp, config)
}

/// Writes the stub captioner. When `produce_captions` is false the script
/// exits 0 without writing anything, simulating a silently failing tool.
fn write_captioner_script(root: &Path, produce_captions: bool) {
    let input = root.join("input");
    let body = if produce_captions {
        format!(
            "#!/bin/sh\n\
             echo 'a woman smiling' > {input}/1.txt\n\
             echo 'a dog running' > {input}/2.txt\n\
             echo '{{\"image_path\": \"1.png\", \"caption\": \"a woman smiling\"}}' > {input}/0_dataset.jsonl\n",
            input = input.display()
        )
    } else {
        "#!/bin/sh\nexit 0\n".to_string()
    };
    fs::write(root.join("run_comfy.sh"), body).unwrap();
}

fn stage_status(report: &loraforge::pipeline::PipelineReport, stage: Stage) -> StageStatus {
    report.stage(stage).map(|r| r.status).unwrap()
}

#[tokio::test]
async fn full_pipeline_succeeds_and_rewrites_everything() {
    let (temp, config) = fixture_project();
    let root = temp.path();

    let orchestrator = PipelineOrchestrator::new(config).unwrap();
    let report = orchestrator.run().await;

    assert!(report.is_success(), "outcome: {:?}", report.outcome);
    assert_eq!(report.stages.len(), Stage::ALL.len());
    for stage in Stage::ALL {
        assert_eq!(stage_status(&report, stage), StageStatus::Succeeded);
    }

    // Workflow now points at the dataset and input directories.
    let doc: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(root.join("comfyui-workflows").join("GenTextForImages.json")).unwrap(),
    )
    .unwrap();
    let loader_dir = doc["nodes"][0]["widgets_values"][0].as_str().unwrap();
    assert!(loader_dir.ends_with("dataset"));

    // Captions carry the trigger word.
    assert_eq!(
        fs::read_to_string(root.join("input").join("1.txt")).unwrap(),
        "a zed123 smiling\n"
    );
    assert_eq!(
        fs::read_to_string(root.join("input").join("2.txt")).unwrap(),
        "zed123 a dog running\n"
    );

    // Trainer config points at the resolved model paths.
    let trainer = fs::read_to_string(root.join("configs").join("trainer.toml")).unwrap();
    assert!(trainer.contains("models/dit.safetensors"));
    assert!(trainer.contains("models/vae.safetensors"));
    assert!(trainer.starts_with("epochs = 16\n"));

    // Dataset config points at the jsonl the captioner emitted.
    let dataset = fs::read_to_string(root.join("configs").join("dataset.toml")).unwrap();
    assert!(dataset.contains("0_dataset.jsonl"));
}

#[tokio::test]
async fn missing_captions_fail_the_captioner_stage_and_skip_the_rest() {
    let (temp, config) = fixture_project();
    write_captioner_script(temp.path(), false);

    let orchestrator = PipelineOrchestrator::new(config).unwrap();
    let report = orchestrator.run().await;

    assert_eq!(report.failed_stage(), Some(Stage::RunCaptioner));
    assert_eq!(
        stage_status(&report, Stage::PatchWorkflow),
        StageStatus::Succeeded
    );
    for stage in [
        Stage::RewriteCaptions,
        Stage::PatchConfigs,
        Stage::CacheLatents,
        Stage::CacheTextEncoderOutputs,
        Stage::TrainNetwork,
    ] {
        assert_eq!(stage_status(&report, stage), StageStatus::Skipped);
    }
}

#[tokio::test]
async fn malformed_workflow_fails_first_stage_without_writing() {
    let (temp, config) = fixture_project();
    let workflow_path = temp
        .path()
        .join("comfyui-workflows")
        .join("GenTextForImages.json");
    fs::write(&workflow_path, "{ definitely not json").unwrap();

    let orchestrator = PipelineOrchestrator::new(config).unwrap();
    let report = orchestrator.run().await;

    assert_eq!(report.failed_stage(), Some(Stage::PatchWorkflow));
    assert_eq!(
        fs::read_to_string(&workflow_path).unwrap(),
        "{ definitely not json"
    );
}

#[tokio::test]
async fn failing_external_tool_surfaces_its_stderr() {
    let (temp, config) = fixture_project();
    let root = temp.path();

    let fail_script = root.join("fail.sh");
    fs::write(&fail_script, "#!/bin/sh\necho latents broke >&2\nexit 2\n").unwrap();
    fs::write(
        root.join("commands").join("cache_latents.args"),
        format!("bash {}\n", fail_script.display()),
    )
    .unwrap();

    let orchestrator = PipelineOrchestrator::new(config).unwrap();
    let report = orchestrator.run().await;

    assert_eq!(report.failed_stage(), Some(Stage::CacheLatents));
    let failed = report.stage(Stage::CacheLatents).unwrap();
    assert!(failed.stderr.as_deref().unwrap().contains("latents broke"));
    assert_eq!(
        stage_status(&report, Stage::TrainNetwork),
        StageStatus::Skipped
    );
}

#[tokio::test]
async fn cancellation_terminates_the_running_stage() {
    let (temp, config) = fixture_project();
    fs::write(
        temp.path().join("commands").join("train_network.args"),
        "sleep 30\n",
    )
    .unwrap();

    let orchestrator = PipelineOrchestrator::new(config).unwrap();
    let handle = orchestrator.cancel_handle();

    let (report, ()) = tokio::join!(orchestrator.run(), async {
        // Let the fast stages finish first; the sleep stage is then in flight.
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.cancel();
    });

    assert_eq!(report.failed_stage(), Some(Stage::TrainNetwork));
    let cause = match &report.outcome {
        loraforge::pipeline::PipelineOutcome::Failed { cause, .. } => cause.clone(),
        other => panic!("unexpected outcome {other:?}"),
    };
    assert!(cause.to_lowercase().contains("cancel"), "cause: {cause}");
}

#[tokio::test]
async fn missing_dataset_jsonl_fails_cache_latents() {
    let (temp, config) = fixture_project();
    // Captioner writes captions but no jsonl.
    let input = temp.path().join("input");
    fs::write(
        temp.path().join("run_comfy.sh"),
        format!(
            "#!/bin/sh\necho 'a woman' > {input}/1.txt\necho 'a man' > {input}/2.txt\n",
            input = input.display()
        ),
    )
    .unwrap();

    let orchestrator = PipelineOrchestrator::new(config).unwrap();
    let report = orchestrator.run().await;

    assert_eq!(report.failed_stage(), Some(Stage::CacheLatents));
    let failed = report.stage(Stage::CacheLatents).unwrap();
    assert!(failed
        .error
        .as_deref()
        .unwrap()
        .contains("Missing artifact"));
}
