use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn simbatch(working_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_simbatch"))
        .args(args)
        .current_dir(working_dir)
        .env_remove("SLURM_ARRAY_JOB_ID")
        .env_remove("SLURM_ARRAY_TASK_ID")
        .env_remove("VMCWORKDIR")
        .env("SIMBATCH_LOG", "warn")
        .output()
        .expect("simbatch binary should run")
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent directory should be created");
    }
    fs::write(path, content).expect("file should be written");
}

fn write_config(temp: &TempDir, extra: &str) -> std::path::PathBuf {
    let root = temp.path();
    let config = format!(
        r#"{{
          "jobName": "testprod",
          "events": 100,
          "particle": "phi",
          "system": "auau",
          "energy": "8gev",
          "workflowRoot": "{root}/cbmroot",
          "plutoRoot": "{root}/gen/pluto",
          "urqmdRoot": "{root}/gen/urqmd"{extra}
        }}"#,
        root = root.display(),
        extra = extra,
    );
    let path = root.join("run.json");
    write_file(&path, &config);
    path
}

fn write_generator_inputs(temp: &TempDir, task: u32) {
    let gen_root = temp.path().join("gen");
    write_file(
        &gen_root.join(format!(
            "urqmd/auau/8gev/centr_0_10/urqmd.auau.8gev.centr.{:05}.root",
            task
        )),
        "background",
    );
    write_file(
        &gen_root.join(format!("pluto/auau/8gev/phi/phi.auau.8gev_{:05}.root", task)),
        "signal",
    );
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn paths_command_prints_the_file_set_of_one_task() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_config(&temp, "");

    let output = simbatch(temp.path(), &["paths", "-c", "run.json", "--task-id", "7"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let parsed: Value = serde_json::from_str(&stdout(&output)).expect("stdout should be JSON");
    assert_eq!(parsed["index"], 7);
    assert!(
        parsed["signalInput"]
            .as_str()
            .expect("phi has a signal input")
            .ends_with("gen/pluto/auau/8gev/phi/phi.auau.8gev_00007.root")
    );
    assert!(
        parsed["backgroundInput"]
            .as_str()
            .unwrap()
            .ends_with("centr_0_10/urqmd.auau.8gev.centr.00007.root")
    );
    let data_dir = temp.path().join("data");
    assert_eq!(
        parsed["transport"],
        data_dir.join("tra.00007.root").display().to_string()
    );
    assert_eq!(
        parsed["reco"],
        data_dir.join("reco.00007.root").display().to_string()
    );
}

#[test]
fn unknown_particle_is_an_input_error() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_config(&temp, r#", "stages": ["transport"]"#);

    let output = simbatch(
        temp.path(),
        &["job", "-c", "run.json", "data", "sis100_electron", "kaon", "--task-id", "1"],
    );
    assert_eq!(output.status.code(), Some(2));
    let stderr = stderr(&output);
    assert!(stderr.contains("ERROR: [INPUT.UNKNOWN_CATEGORY]"), "stderr: {}", stderr);
    assert!(stderr.contains("kaon"));
    assert!(stderr.contains("FATAL EXIT CODE: 2"));
    assert!(!temp.path().join("workdir").exists());
}

#[test]
fn unknown_config_keys_are_rejected() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_config(&temp, r#", "particel": "phi""#);

    let output = simbatch(temp.path(), &["paths", "-c", "run.json", "--task-id", "1"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("INPUT.CONFIG_PARSE"));
}

#[test]
fn dry_run_prints_stage_commands_without_touching_the_workspace() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_config(&temp, r#", "stages": ["digi", "transport", "reco"]"#);
    let report = temp.path().join("reports/dry.json");

    let output = simbatch(
        temp.path(),
        &[
            "job",
            "-c",
            "run.json",
            "--job-id",
            "100",
            "--task-id",
            "3",
            "--dry-run",
            "--report",
            "reports/dry.json",
        ],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let stdout = stdout(&output);
    let commands: Vec<&str> = stdout
        .lines()
        .filter(|line| line.starts_with("root "))
        .collect();
    assert_eq!(commands.len(), 3);
    assert!(commands[0].starts_with("root -l -b -q "));
    assert!(commands[0].contains("cbmroot/macro/rich/run/run_transport.C("));
    assert!(commands[1].contains("run_digi.C("));
    assert!(commands[2].contains("run_reco.C("));
    assert!(commands[2].contains("tra.00003.root"));
    assert!(!temp.path().join("workdir/100_3").exists());

    let parsed: Value =
        serde_json::from_str(&fs::read_to_string(report).expect("report should exist"))
            .expect("report should be JSON");
    let stages = parsed["stages"].as_array().expect("stages array");
    assert_eq!(stages.len(), 3);
    assert_eq!(stages[0]["stage"], "transport");
    assert_eq!(stages[0]["status"], "succeeded");
}

#[test]
fn empty_stage_selection_is_rejected() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_config(&temp, "");

    let output = simbatch(
        temp.path(),
        &["job", "-c", "run.json", "--task-id", "1", "--dry-run"],
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("INPUT.STAGES"));
}

#[cfg(unix)]
#[test]
fn failing_stage_halts_the_chain_and_names_the_exit_code() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_config(
        &temp,
        r#", "interpreter": "false", "stages": ["transport", "digitization", "reconstruction"]"#,
    );
    write_generator_inputs(&temp, 1);
    let stale = temp.path().join("workdir/local_1/stale.root");
    write_file(&stale, "previous attempt");

    let output = simbatch(
        temp.path(),
        &["job", "-c", "run.json", "--task-id", "1", "--report", "report.json"],
    );
    assert_eq!(output.status.code(), Some(4), "stderr: {}", stderr(&output));

    let stderr = stderr(&output);
    assert!(stderr.contains("ERROR: [RUN.EXTERNAL_TOOL]"), "stderr: {}", stderr);
    assert!(stderr.contains("TRANSPORT"));
    assert!(stderr.contains("exit code 1"));
    assert!(stderr.contains("FATAL EXIT CODE: 4"));

    assert!(temp.path().join("workdir/local_1").is_dir());
    assert!(!stale.exists(), "workspace should be reset before the first stage");

    let parsed: Value = serde_json::from_str(
        &fs::read_to_string(temp.path().join("report.json")).expect("report should exist"),
    )
    .expect("report should be JSON");
    let stages = parsed["stages"].as_array().expect("stages array");
    assert_eq!(stages[0]["status"], "failed");
    assert_eq!(stages[0]["exitCode"], 1);
    assert_eq!(stages[1]["status"], "skipped");
    assert_eq!(stages[2]["status"], "skipped");
}

#[test]
fn missing_generator_input_stops_before_running_anything() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_config(
        &temp,
        r#", "interpreter": "/nonexistent/root", "stages": ["transport"]"#,
    );

    let output = simbatch(temp.path(), &["job", "-c", "run.json", "--task-id", "2"]);
    assert_eq!(output.status.code(), Some(3));
    let stderr = stderr(&output);
    assert!(stderr.contains("IO.MISSING_UPSTREAM"), "stderr: {}", stderr);
    assert!(stderr.contains("urqmd.auau.8gev.centr.00002.root"));
}

#[test]
fn submit_dry_run_writes_the_batch_script() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_config(&temp, r#", "stages": ["transport", "digi"], "timeLimit": "1-02:00:00""#);

    let output = simbatch(
        temp.path(),
        &[
            "submit",
            "-c",
            "run.json",
            "-n",
            "phi8",
            "-j",
            "5",
            "--max-concurrent",
            "2",
            "--partition",
            "long",
            "--dry-run",
        ],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let line = stdout(&output);
    let line = line.trim();
    assert!(line.starts_with("sbatch "), "stdout: {}", line);
    assert!(line.contains("--job-name=phi8"));
    assert!(line.contains("--time=1-02:00:00"));
    assert!(line.contains("--array=1-5%2"));
    assert!(line.contains("--partition=long"));
    assert!(line.contains("phi8.%A_%a.out"));

    let log_dir = temp.path().join("log");
    assert!(temp.path().join("data").is_dir());
    let script = fs::read_to_string(log_dir.join("phi8.sbatch")).expect("script should exist");
    assert!(script.starts_with("#!/bin/bash\n"));
    assert!(script.contains(" job --config "));
    assert!(script.contains("phi8.submit.json"));

    let frozen: Value = serde_json::from_str(
        &fs::read_to_string(log_dir.join("phi8.submit.json")).expect("config should be frozen"),
    )
    .expect("frozen config should be JSON");
    assert_eq!(frozen["jobs"], 5);
    assert_eq!(frozen["jobName"], "phi8");
    assert_eq!(frozen["partition"], "long");
}

#[test]
fn submit_keeps_existing_data_unless_asked_to_remove_it() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_config(&temp, "");
    let kept = temp.path().join("data/tra.00001.root");
    write_file(&kept, "precious");

    let output = simbatch(temp.path(), &["submit", "-c", "run.json", "--dry-run"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(kept.is_file());

    let output = simbatch(temp.path(), &["submit", "-c", "run.json", "-r", "--dry-run"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(!kept.exists());
    assert!(temp.path().join("data").is_dir());
}

#[test]
fn merge_reports_missing_task_outputs() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_config(&temp, "");
    write_file(&temp.path().join("data/qa.00001.root"), "qa");

    let output = simbatch(
        temp.path(),
        &["merge", "-c", "run.json", "-j", "2", "--kind", "qa"],
    );
    assert_eq!(output.status.code(), Some(3));
    let stderr = stderr(&output);
    assert!(stderr.contains("IO.MISSING_UPSTREAM"));
    assert!(stderr.contains("qa.00002.root"));

    let bad_kind = simbatch(temp.path(), &["merge", "-c", "run.json", "--kind", "digi"]);
    assert_eq!(bad_kind.status.code(), Some(2));
}

#[cfg(unix)]
#[test]
fn local_launch_runs_every_task_in_its_own_workspace() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_config(&temp, r#", "interpreter": "true", "stages": ["transport"]"#);
    write_generator_inputs(&temp, 1);
    write_generator_inputs(&temp, 2);

    let output = simbatch(temp.path(), &["local", "-c", "run.json", "-j", "2", "--wait"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Launched 2 local tasks."));
    assert!(temp.path().join("workdir/local_1").is_dir());
    assert!(temp.path().join("workdir/local_2").is_dir());
}

#[test]
fn local_wait_fails_when_a_task_fails() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_config(&temp, "");

    let output = simbatch(temp.path(), &["local", "-c", "run.json", "-j", "2", "--wait"]);
    assert_eq!(output.status.code(), Some(4));
    let stderr = stderr(&output);
    assert!(stderr.contains("RUN.LOCAL_TASKS"), "stderr: {}", stderr);
    assert!(stderr.contains("2 of 2 local tasks failed"));
}

#[test]
fn help_exits_successfully() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = simbatch(temp.path(), &["--help"]);
    assert!(output.status.success());
    let stdout = stdout(&output);
    for command in ["submit", "job", "local", "merge", "paths"] {
        assert!(stdout.contains(command), "help should list {}", command);
    }
}
