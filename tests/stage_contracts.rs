mod common;

use common::*;
use crew_pipeline::agents::{self, StageContext};
use crew_pipeline::analysis::{create_sample_data, DataFrame};
use crew_pipeline::deck::read_slides;
use crew_pipeline::llm::ModelTiers;
use crew_pipeline::pipeline::artifacts::{CLEANED_DATA, JIRA_TICKET, PRESENTATION, UPLOADED_DATA};
use crew_pipeline::types::AppError;

fn context(dir: &std::path::Path) -> StageContext {
    let config = config(dir);
    let tiers = ModelTiers::from_config(&config, None).unwrap();
    StageContext::new(&config, tiers)
}

#[tokio::test]
async fn test_intake_writes_ticket_and_plan() {
    let dir = tempfile::tempdir().unwrap();
    let script = Scripted::new(dir.path(), intake_script());
    let ctx = context(dir.path());

    let outcome = agents::intake::run(&ctx, &ScriptedFactory(script.clone()), "Build a churn model")
        .await
        .unwrap();

    assert!(outcome.approval.starts_with("APPROVED"));
    assert!(outcome.ticket.starts_with("PROJ-101"));
    assert!(outcome.plan.starts_with("# Project Plan"));
    assert_eq!(script.remaining(), 0);

    // review on the capable tier, bookkeeping on the fast tier
    let models = script.models();
    assert_eq!(models[0], "gemini-2.5-pro");
    assert!(models[1..].iter().all(|m| m == "gemini-2.5-flash"));
}

#[tokio::test]
async fn test_intake_prompt_carries_request() {
    let dir = tempfile::tempdir().unwrap();
    let script = Scripted::new(dir.path(), intake_script());
    let ctx = context(dir.path());

    agents::intake::run(&ctx, &ScriptedFactory(script.clone()), "Predict subscription cancellations")
        .await
        .unwrap();

    let requests = script.requests.lock().unwrap();
    assert!(requests[0].messages[0].content.contains("'Predict subscription cancellations'"));
    assert!(requests[0].tools.is_empty());
    assert_eq!(requests[1].tools[0].name, "save_file");
}

#[tokio::test]
async fn test_intake_without_ticket_is_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let script = Scripted::new(dir.path(), vec![text("APPROVED"), text("I would create a ticket.")]);
    let ctx = context(dir.path());

    let err = agents::intake::run(&ctx, &ScriptedFactory(script), "Build a churn model")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingArtifact(ref name) if name == JIRA_TICKET));
}

#[tokio::test]
async fn test_intake_rejects_empty_request() {
    let dir = tempfile::tempdir().unwrap();
    let script = Scripted::new(dir.path(), vec![]);
    let err = agents::intake::run(&context(dir.path()), &ScriptedFactory(script.clone()), "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
    assert!(script.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_data_engineering_produces_clean_csv() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(UPLOADED_DATA), RAW_CSV).unwrap();
    let script = Scripted::new(dir.path(), data_script());
    let ctx = context(dir.path());

    let outcome = agents::data_engineering::run(&ctx, &ScriptedFactory(script.clone()), UPLOADED_DATA, "churn")
        .await
        .unwrap();

    assert_eq!(outcome.cleaned_path, dir.path().join(CLEANED_DATA));
    assert_eq!(outcome.columns, vec!["Age", "Annual_Spend", "Support_Calls", "Churn"]);
    assert_eq!(outcome.rows, 12);

    let cleaned = DataFrame::from_path(&outcome.cleaned_path).unwrap();
    assert!(cleaned.rows.iter().all(|r| r[3] == "0" || r[3] == "1"));

    // the inspect_csv result was fed back to the model
    let requests = script.requests.lock().unwrap();
    let tool_turn = requests[1].messages.last().unwrap();
    assert!(tool_turn.content.contains("Shape: (13, 5)"));
}

#[tokio::test]
async fn test_data_engineering_requires_input() {
    let dir = tempfile::tempdir().unwrap();
    let script = Scripted::new(dir.path(), data_script());
    let err = agents::data_engineering::run(&context(dir.path()), &ScriptedFactory(script), UPLOADED_DATA, "churn")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_data_engineering_without_output_is_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(UPLOADED_DATA), RAW_CSV).unwrap();
    let script = Scripted::new(dir.path(), vec![text("Looks clean to me.")]);

    let err = agents::data_engineering::run(&context(dir.path()), &ScriptedFactory(script), UPLOADED_DATA, "churn")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingArtifact(ref name) if name == CLEANED_DATA));
}

#[tokio::test]
async fn test_analysis_reports_training_result() {
    let dir = tempfile::tempdir().unwrap();
    create_sample_data(&dir.path().join(CLEANED_DATA)).unwrap();
    let script = Scripted::new(dir.path(), analysis_script());

    let outcome = agents::analysis::run(&context(dir.path()), &ScriptedFactory(script), "churn")
        .await
        .unwrap();

    assert!(outcome.summary.contains("Support_Calls"));
    let training = outcome.training.unwrap();
    assert!(training.starts_with("Model Trained. Accuracy: "));
    assert!(training.contains("'Support_Calls': "));
}

#[tokio::test]
async fn test_analysis_needs_cleaned_data() {
    let dir = tempfile::tempdir().unwrap();
    let script = Scripted::new(dir.path(), analysis_script());
    let err = agents::analysis::run(&context(dir.path()), &ScriptedFactory(script), "churn")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingArtifact(_)));
}

#[tokio::test]
async fn test_reporting_saves_three_slide_deck() {
    let dir = tempfile::tempdir().unwrap();
    let script = Scripted::new(dir.path(), reporting_script());

    let outcome = agents::reporting::run(
        &context(dir.path()),
        &ScriptedFactory(script.clone()),
        "Accuracy 0.75, Support_Calls drives churn",
    )
    .await
    .unwrap();

    assert_eq!(outcome.deck_path, dir.path().join(PRESENTATION));
    let slides = read_slides(&outcome.deck_path).unwrap();
    assert_eq!(slides.len(), 3);
    assert_eq!(slides[0].title, "Project Update: Churn Analysis");

    let requests = script.requests.lock().unwrap();
    assert!(requests[0].messages[0].content.contains("Accuracy 0.75, Support_Calls drives churn"));
    assert_eq!(requests[0].model, "gemini-2.5-flash");
}

#[tokio::test]
async fn test_reporting_requires_summary() {
    let dir = tempfile::tempdir().unwrap();
    let script = Scripted::new(dir.path(), reporting_script());
    let err = agents::reporting::run(&context(dir.path()), &ScriptedFactory(script), "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingPrerequisite(_)));
}

#[tokio::test]
async fn test_previous_outputs_do_not_satisfy_a_stage() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(UPLOADED_DATA), RAW_CSV).unwrap();
    std::fs::write(dir.path().join(CLEANED_DATA), "Old,Churn\n1,0\n").unwrap();
    std::fs::write(dir.path().join(JIRA_TICKET), "PROJ-0").unwrap();
    std::fs::write(dir.path().join(PRESENTATION), "old deck").unwrap();
    let ctx = context(dir.path());

    let script = Scripted::new(dir.path(), vec![text("The data is fine.")]);
    let err = agents::data_engineering::run(&ctx, &ScriptedFactory(script), UPLOADED_DATA, "churn")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingArtifact(ref name) if name == CLEANED_DATA));

    let script = Scripted::new(dir.path(), vec![text("APPROVED"), text("Done."), text("Done.")]);
    let err = agents::intake::run(&ctx, &ScriptedFactory(script), "Build a churn model")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingArtifact(ref name) if name == JIRA_TICKET));

    let script = Scripted::new(dir.path(), vec![text("Deck is done.")]);
    let err = agents::reporting::run(&ctx, &ScriptedFactory(script), "Support_Calls drives churn")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingArtifact(ref name) if name == PRESENTATION));
}
