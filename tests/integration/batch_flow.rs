use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use papercast::batch::BatchOrchestrator;
use papercast::pipeline::Stage;

use super::{FakeModelClient, FixtureTextSource, PipelineHarness, ScriptedResponse};

#[test]
fn a_failing_file_does_not_stop_the_batch() {
    let harness = PipelineHarness::new();
    let settings = harness.settings();
    harness.add_pdf("Adams (2001) First Paper.pdf");
    harness.add_pdf("Brown (2002) Second Paper.pdf");
    harness.add_pdf("Clark (2003) Third Paper.pdf");

    // The middle file has no fixture text, so its extraction fails.
    let fixture = FixtureTextSource::new()
        .with("Adams (2001) First Paper.pdf", "Text of the first paper.")
        .with("Clark (2003) Third Paper.pdf", "Text of the third paper.");
    let client = FakeModelClient::scripted(
        vec![
            ScriptedResponse::Text("Summary one".to_string()),
            ScriptedResponse::Text("Summary three".to_string()),
        ],
        "unused",
    );

    let orchestrator = BatchOrchestrator::new(&settings, client.clone())
        .with_text_source(Box::new(fixture));
    let report = orchestrator.run(&harness.input_dir()).expect("run");

    assert_eq!(report.processed, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.summaries_created, 2);

    assert_eq!(
        report.outcomes[0].record.summary.as_deref(),
        Some("Summary one")
    );
    assert!(report.outcomes[1].failed());
    assert_eq!(report.outcomes[1].record.summary, None);
    assert_eq!(
        report.outcomes[2].record.summary.as_deref(),
        Some("Summary three")
    );

    // One summarization call per readable file, no metadata fallback needed.
    assert_eq!(client.completion_count(), 2);

    // Summaries are persisted next to the future audio files.
    assert!(harness.output_dir().join("Adams_(2001)_First_Paper.txt").exists());
    assert!(harness.output_dir().join("Clark_(2003)_Third_Paper.txt").exists());
}

#[test]
fn costs_sum_only_successful_calls() {
    let harness = PipelineHarness::new();
    let settings = harness.settings();
    harness.add_pdf("Adams (2001) First Paper.pdf");
    harness.add_pdf("Brown (2002) Second Paper.pdf");

    let fixture = FixtureTextSource::new()
        .with("Adams (2001) First Paper.pdf", "First text.")
        .with("Brown (2002) Second Paper.pdf", "Second text.");
    // First summarization succeeds, second fails.
    let client = FakeModelClient::scripted(
        vec![
            ScriptedResponse::Text("Summary".to_string()),
            ScriptedResponse::Fail,
        ],
        "unused",
    );

    let orchestrator =
        BatchOrchestrator::new(&settings, client).with_text_source(Box::new(fixture));
    let report = orchestrator.run(&harness.input_dir()).expect("run");

    // One million units at gpt-4o-mini rates: 0.15 in, 0.6 out.
    assert_eq!(report.costs.input_cost, 0.15);
    assert_eq!(report.costs.output_cost, 0.6);
    assert_eq!(report.costs.total(), 0.75);
    assert_eq!(report.summaries_created, 1);
}

#[test]
fn newsletter_is_skipped_without_summaries() {
    let harness = PipelineHarness::new();
    let mut settings = harness.settings();
    settings.build_newsletter = true;
    harness.add_pdf("Adams (2001) First Paper.pdf");

    // No fixture text: the only file fails extraction, nothing is summarized.
    let fixture = FixtureTextSource::new();
    let client = FakeModelClient::returning("unused");

    let orchestrator = BatchOrchestrator::new(&settings, client.clone())
        .with_text_source(Box::new(fixture));
    let report = orchestrator.run(&harness.input_dir()).expect("run");

    assert_eq!(report.summaries_created, 0);
    assert_eq!(client.completion_count(), 0);
    assert_eq!(report.costs.total(), 0.0);
}

#[test]
fn newsletter_joins_all_summaries_into_one_call() {
    let harness = PipelineHarness::new();
    let mut settings = harness.settings();
    settings.build_newsletter = true;
    harness.add_pdf("Adams (2001) First Paper.pdf");
    harness.add_pdf("Brown (2002) Second Paper.pdf");

    let fixture = FixtureTextSource::new()
        .with("Adams (2001) First Paper.pdf", "First text.")
        .with("Brown (2002) Second Paper.pdf", "Second text.");
    let client = FakeModelClient::scripted(
        vec![
            ScriptedResponse::Text("Summary one".to_string()),
            ScriptedResponse::Text("Summary two".to_string()),
            ScriptedResponse::Text("The newsletter".to_string()),
        ],
        "unused",
    );

    let orchestrator = BatchOrchestrator::new(&settings, client.clone())
        .with_text_source(Box::new(fixture));
    orchestrator.run(&harness.input_dir()).expect("run");

    let completions = client.completions();
    assert_eq!(completions.len(), 3);
    let newsletter_call = &completions[2];
    assert!(newsletter_call.prompt.contains("Summary one"));
    assert!(newsletter_call.prompt.contains("Summary two"));
    assert!(newsletter_call.prompt.contains("---"));
}

#[test]
fn audio_files_are_written_for_summarized_papers() {
    let harness = PipelineHarness::new();
    let mut settings = harness.settings();
    settings.create_audio = true;
    harness.add_pdf("Adams (2001) First Paper.pdf");

    let fixture =
        FixtureTextSource::new().with("Adams (2001) First Paper.pdf", "First text.");
    let client = FakeModelClient::scripted(
        vec![
            ScriptedResponse::Text("Summary one".to_string()),
            ScriptedResponse::WithAudio {
                text: "Spoken summary".to_string(),
                audio_b64: BASE64.encode([0x49, 0x44, 0x33, 0x04]),
            },
        ],
        "unused",
    );

    let orchestrator =
        BatchOrchestrator::new(&settings, client).with_text_source(Box::new(fixture));
    let report = orchestrator.run(&harness.input_dir()).expect("run");

    assert!(report.outcomes[0]
        .completed
        .contains(&Stage::SynthesizeAudio));
    assert!(harness
        .output_dir()
        .join("Adams_(2001)_First_Paper.mp3")
        .exists());
}

#[test]
fn sources_are_deleted_when_configured() {
    let harness = PipelineHarness::new();
    let mut settings = harness.settings();
    settings.delete_after_processing = true;
    let path = harness.add_pdf("Adams (2001) First Paper.pdf");

    let fixture =
        FixtureTextSource::new().with("Adams (2001) First Paper.pdf", "First text.");
    let client = FakeModelClient::returning("Summary");

    let orchestrator =
        BatchOrchestrator::new(&settings, client).with_text_source(Box::new(fixture));
    orchestrator.run(&harness.input_dir()).expect("run");

    assert!(!path.exists());
}
