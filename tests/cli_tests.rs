use std::process::{Command, Output};

/// Runs the binary with a clean grading environment.
fn oxgrade(args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_oxgrade"));
    cmd.args(args)
        .env_remove("OXGRADE_QUESTION_SET")
        .env_remove("OXGRADE_GRADING")
        .env_remove("OXGRADE_COMPLETION_TIMEOUT_SECS")
        .env_remove("OXGRADE_MAX_COMPLETION_TOKENS")
        .env("OPENAI_API_KEY", "sk-test")
        .env("SUPABASE_URL", "http://127.0.0.1:9")
        .env("SUPABASE_SERVICE_ROLE_KEY", "service-role");
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.output().expect("binary runs")
}

#[test]
fn grade_with_blank_student_id_exits_nonzero() {
    let output = oxgrade(&["grade", "   ", "a", "b", "c"], &[]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("학번을 입력해 주세요."), "stderr: {stderr}");
}

#[test]
fn grade_with_blank_answer_names_the_question() {
    let output = oxgrade(&["grade", "20101", "a", " ", "c"], &[]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("문항 2에 대한 답안을 작성해 주세요."), "stderr: {stderr}");
}

#[test]
fn zero_completion_timeout_is_a_config_error() {
    let output = oxgrade(&["questions"], &[("OXGRADE_COMPLETION_TIMEOUT_SECS", "0")]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("OXGRADE_COMPLETION_TIMEOUT_SECS"), "stderr: {stderr}");
}

#[test]
fn questions_prints_the_default_set() {
    let output = oxgrade(&["questions"], &[]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"name\": \"el-nino\""));
}
