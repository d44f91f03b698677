use async_trait::async_trait;
use image_pipeline::clients::{EditRequest, GenerateRequest, ImageProvider, ProviderRegistry};
use image_pipeline::config::EngineSettings;
use image_pipeline::error::{AssetError, ErrorCode, ProviderError};
use image_pipeline::infrastructure::{AssetStore, InMemorySubmissionStore, SubmissionStore};
use image_pipeline::models::{
    BlockConfig, GenerationConfig, ImageSource, OptionMapping, Participant, PipelineBlock,
    PipelineDefinition, QuestionMapping, RecordedAnswer, ReferenceImageSpec, ScoringConfig,
    ScoringProfile, Submission, SubmissionStatus,
};
use image_pipeline::services::RetryPolicy;
use image_pipeline::PipelineOrchestrator;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ========== 测试替身 ==========

#[derive(Default)]
struct FakeAssets {
    files: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
    stores: AtomicUsize,
}

impl FakeAssets {
    fn with(files: &[(&str, &[u8])]) -> Arc<Self> {
        let assets = Self::default();
        {
            let mut map = assets.files.lock().unwrap();
            for (k, v) in files {
                map.insert(k.to_string(), v.to_vec());
            }
        }
        Arc::new(assets)
    }
}

#[async_trait]
impl AssetStore for FakeAssets {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, AssetError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(reference.to_string()))
    }

    async fn store(&self, key: &str, bytes: &[u8]) -> Result<String, AssetError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(format!("fake://{}", key))
    }
}

/// 记录每次调用的假图像服务
///
/// - `script` 中的结果依次返回，用完后返回 `[n]`（n 为调用序号）
/// - 每次调用前按 `delays` 依次休眠
#[derive(Default)]
struct FakeProvider {
    script: Mutex<VecDeque<Result<Vec<u8>, ProviderError>>>,
    delays: Mutex<VecDeque<Duration>>,
    calls: Mutex<Vec<Call>>,
}

#[derive(Debug, Clone)]
struct Call {
    kind: &'static str,
    prompt: String,
    images: Vec<Vec<u8>>,
}

impl FakeProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn scripted(script: Vec<Result<Vec<u8>, ProviderError>>) -> Arc<Self> {
        let provider = Self::default();
        *provider.script.lock().unwrap() = script.into();
        Arc::new(provider)
    }

    fn delayed(delays: Vec<Duration>) -> Arc<Self> {
        let provider = Self::default();
        *provider.delays.lock().unwrap() = delays.into();
        Arc::new(provider)
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    async fn respond(&self, call: Call) -> Result<Vec<u8>, ProviderError> {
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            calls.len() as u8
        };
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(vec![n]))
    }
}

#[async_trait]
impl ImageProvider for FakeProvider {
    fn provider_name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Vec<u8>, ProviderError> {
        self.respond(Call {
            kind: "generate",
            prompt: request.prompt.clone(),
            images: Vec::new(),
        })
        .await
    }

    async fn edit(&self, request: &EditRequest) -> Result<Vec<u8>, ProviderError> {
        self.respond(Call {
            kind: "edit",
            prompt: request.prompt.clone(),
            images: request.images.iter().map(|i| i.data.to_vec()).collect(),
        })
        .await
    }
}

// ========== 构造辅助 ==========

const MODEL: &str = "fake-model";

fn settings(timeout: Duration) -> EngineSettings {
    EngineSettings {
        pipeline_timeout: timeout,
        retry: RetryPolicy::new(3, Duration::from_millis(200)),
    }
}

fn orchestrator(
    store: Arc<InMemorySubmissionStore>,
    assets: Arc<FakeAssets>,
    provider: Arc<FakeProvider>,
    timeout: Duration,
) -> PipelineOrchestrator {
    let registry = ProviderRegistry::new().with_provider(MODEL, provider);
    PipelineOrchestrator::new(store, assets, Arc::new(registry), settings(timeout))
}

fn generation(id: &str, order: u32, prompt: &str, refs: Vec<ReferenceImageSpec>) -> PipelineBlock {
    PipelineBlock {
        id: id.into(),
        name: format!("Generate {}", id),
        order,
        config: BlockConfig::AiGeneration(GenerationConfig {
            model: MODEL.into(),
            prompt_template: prompt.into(),
            reference_images: refs,
            size: None,
        }),
    }
}

fn quiz_block(order: u32) -> PipelineBlock {
    let option = |text: &str, key: &str| OptionMapping {
        option_text: text.into(),
        profile_key: key.into(),
    };
    let profile = |key: &str, name: &str| ScoringProfile {
        key: key.into(),
        name: name.into(),
        description: format!("{} description", name),
        image_style: "comic".into(),
    };
    PipelineBlock {
        id: "quiz-block".into(),
        name: "quiz".into(),
        order,
        config: BlockConfig::Scoring(ScoringConfig {
            selected_questions: vec!["q1".into(), "q2".into()],
            mappings: vec![
                QuestionMapping {
                    question_id: "q1".into(),
                    options: vec![option("Save the day", "HERO"), option("Rule the world", "VILLAIN")],
                },
                QuestionMapping {
                    question_id: "q2".into(),
                    options: vec![option("Cape", "HERO"), option("Lair", "VILLAIN")],
                },
            ],
            profiles: vec![profile("HERO", "Captain Hero"), profile("VILLAIN", "Doctor Doom")],
        }),
    }
}

fn pipeline(blocks: Vec<PipelineBlock>) -> PipelineDefinition {
    PipelineDefinition {
        id: "p1".into(),
        name: "test pipeline".into(),
        blocks,
    }
}

fn alice() -> Submission {
    let mut submission = Submission::new("s-alice");
    submission.participant = Participant {
        name: Some("Alice".into()),
        first_name: Some("A.".into()),
        email: None,
    };
    submission.answers = vec![
        RecordedAnswer {
            element_id: "q1".into(),
            value: "Save the day".into(),
        },
        RecordedAnswer {
            element_id: "q2".into(),
            value: "Cape".into(),
        },
    ];
    submission.capture_ref = Some("captures/alice.png".into());
    submission
}

fn reference(name: &str, source: ImageSource, order: u32) -> ReferenceImageSpec {
    ReferenceImageSpec {
        id: format!("ref-{}", name),
        name: name.into(),
        source,
        url: None,
        producer_block_id: None,
        order,
    }
}

// ========== 场景 ==========

#[tokio::test]
async fn test_quiz_winner_flows_into_prompt() {
    let provider = FakeProvider::new();
    let assets = FakeAssets::with(&[]);
    let engine = orchestrator(
        Arc::new(InMemorySubmissionStore::new()),
        assets,
        provider.clone(),
        Duration::from_secs(60),
    );
    let pipeline = pipeline(vec![
        generation("portrait", 2, "Portrait of {nom} as {quiz_profile_name}", vec![]),
        quiz_block(1),
    ]);

    let result = engine.execute(&pipeline, &alice()).await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(
        result.final_prompt.as_deref(),
        Some("Portrait of Alice as Captain Hero")
    );
    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].kind, "generate");
    assert_eq!(calls[0].prompt, "Portrait of Alice as Captain Hero");
}

#[tokio::test]
async fn test_profile_key_available_to_templates() {
    let provider = FakeProvider::new();
    let engine = orchestrator(
        Arc::new(InMemorySubmissionStore::new()),
        FakeAssets::with(&[]),
        provider.clone(),
        Duration::from_secs(60),
    );
    let pipeline = pipeline(vec![
        quiz_block(1),
        generation("g", 2, "{quiz_profile_key}/{quiz_profile_image_style}/{unknown}!", vec![]),
    ]);

    let result = engine.execute(&pipeline, &alice()).await;

    assert!(result.success);
    assert_eq!(result.final_prompt.as_deref(), Some("HERO/comic/!"));
}

#[tokio::test]
async fn test_zero_generation_blocks_is_invalid_config_without_side_effects() {
    let provider = FakeProvider::new();
    let assets = FakeAssets::with(&[]);
    let engine = orchestrator(
        Arc::new(InMemorySubmissionStore::new()),
        assets.clone(),
        provider.clone(),
        Duration::from_secs(60),
    );

    let result = engine.execute(&pipeline(vec![quiz_block(1)]), &alice()).await;

    assert!(!result.success);
    assert_eq!(result.error_code(), Some(ErrorCode::InvalidConfig));
    assert!(result.block_results.is_empty());
    assert!(provider.calls().is_empty());
    assert_eq!(assets.fetches.load(Ordering::SeqCst), 0);
    assert_eq!(assets.stores.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_forward_producer_reference_rejected_before_any_call() {
    let provider = FakeProvider::new();
    let engine = orchestrator(
        Arc::new(InMemorySubmissionStore::new()),
        FakeAssets::with(&[]),
        provider.clone(),
        Duration::from_secs(60),
    );
    let mut forward = reference("later", ImageSource::PriorBlockOutput, 1);
    forward.producer_block_id = Some("second".into());
    let pipeline = pipeline(vec![
        generation("first", 1, "uses {later}", vec![forward]),
        generation("second", 2, "x", vec![]),
    ]);

    let result = engine.execute(&pipeline, &alice()).await;

    assert_eq!(result.error_code(), Some(ErrorCode::InvalidConfig));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_model_in_later_block_rejected_before_any_call() {
    let provider = FakeProvider::new();
    let assets = FakeAssets::with(&[("captures/alice.png", b"selfie".as_slice())]);
    let engine = orchestrator(
        Arc::new(InMemorySubmissionStore::new()),
        assets.clone(),
        provider.clone(),
        Duration::from_secs(60),
    );
    let mut second = generation(
        "second",
        2,
        "Poster of {selfie}",
        vec![reference("selfie", ImageSource::ParticipantCapture, 1)],
    );
    if let BlockConfig::AiGeneration(cfg) = &mut second.config {
        cfg.model = "no-such-model".into();
    }
    let pipeline = pipeline(vec![generation("first", 1, "x", vec![]), second]);

    let result = engine.execute(&pipeline, &alice()).await;

    assert_eq!(result.error_code(), Some(ErrorCode::InvalidConfig));
    assert!(result.block_results.is_empty());
    assert!(provider.calls().is_empty());
    assert_eq!(assets.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_block_overrunning_budget_is_discarded() {
    let provider = FakeProvider::delayed(vec![Duration::from_secs(2), Duration::from_secs(20)]);
    let engine = orchestrator(
        Arc::new(InMemorySubmissionStore::new()),
        FakeAssets::with(&[]),
        provider.clone(),
        Duration::from_secs(10),
    );
    let pipeline = pipeline(vec![
        generation("fast", 1, "one", vec![]),
        generation("slow", 2, "two", vec![]),
        generation("never", 3, "three", vec![]),
    ]);

    let result = engine.execute(&pipeline, &alice()).await;

    assert!(!result.success);
    assert_eq!(result.error_code(), Some(ErrorCode::Timeout));
    let ids: Vec<&str> = result.block_results.iter().map(|r| r.block_id.as_str()).collect();
    assert_eq!(ids, vec!["fast"]);
    assert_eq!(provider.calls().len(), 2);
}

#[tokio::test]
async fn test_failure_short_circuits_later_blocks() {
    let provider = FakeProvider::scripted(vec![Err(ProviderError::Rejected {
        endpoint: "images/generations".into(),
        status: 400,
        message: "content policy".into(),
    })]);
    let engine = orchestrator(
        Arc::new(InMemorySubmissionStore::new()),
        FakeAssets::with(&[]),
        provider.clone(),
        Duration::from_secs(60),
    );
    let pipeline = pipeline(vec![
        generation("first", 1, "x", vec![]),
        generation("second", 2, "y", vec![]),
    ]);

    let result = engine.execute(&pipeline, &alice()).await;

    assert_eq!(result.error_code(), Some(ErrorCode::ApiError));
    assert!(result.final_image.is_none());
    assert_eq!(result.block_results.len(), 1);
    assert!(!result.block_results[0].success);
    assert_eq!(provider.calls().len(), 1);
}

#[tokio::test]
async fn test_missing_selfie_fails_before_provider_call() {
    let provider = FakeProvider::new();
    let engine = orchestrator(
        Arc::new(InMemorySubmissionStore::new()),
        FakeAssets::with(&[]),
        provider.clone(),
        Duration::from_secs(60),
    );
    let pipeline = pipeline(vec![generation(
        "g",
        1,
        "{selfie}",
        vec![reference("selfie", ImageSource::ParticipantCapture, 1)],
    )]);
    let mut submission = alice();
    submission.capture_ref = None;

    let result = engine.execute(&pipeline, &submission).await;

    assert_eq!(result.error_code(), Some(ErrorCode::SelfieRequiredMissing));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_prior_output_chains_into_next_block() {
    let provider = FakeProvider::new();
    let assets = FakeAssets::with(&[
        ("captures/alice.png", b"selfie".as_slice()),
        ("assets/frame.png", b"frame".as_slice()),
    ]);
    let engine = orchestrator(
        Arc::new(InMemorySubmissionStore::new()),
        assets.clone(),
        provider.clone(),
        Duration::from_secs(60),
    );

    let mut frame = reference("Frame", ImageSource::UploadedAsset, 2);
    frame.url = Some("assets/frame.png".into());
    let mut draft = reference("draft", ImageSource::PriorBlockOutput, 1);
    draft.producer_block_id = Some("sketch".into());

    let pipeline = pipeline(vec![
        generation(
            "sketch",
            1,
            "Sketch of {selfie}",
            vec![reference("selfie", ImageSource::ParticipantCapture, 1)],
        ),
        generation("final", 2, "Put {draft} inside {frame}", vec![frame, draft]),
    ]);

    let result = engine.execute(&pipeline, &alice()).await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    let calls = provider.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].prompt, "Sketch of Image 1");
    assert_eq!(calls[0].images, vec![b"selfie".to_vec()]);
    assert_eq!(calls[1].kind, "edit");
    assert_eq!(calls[1].prompt, "Put Image 1 inside Image 2");
    // 第一块的输出 [1] 原样传给第二块
    assert_eq!(calls[1].images, vec![vec![1u8], b"frame".to_vec()]);
    assert_eq!(result.block_results[1].references.len(), 2);
    assert_eq!(result.block_results[1].references[0].size, 1);
    assert_eq!(result.final_image.as_deref(), Some(&vec![2u8]));
    assert_eq!(assets.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_retried_within_block() {
    let provider = FakeProvider::scripted(vec![
        Err(ProviderError::RateLimited {
            endpoint: "images/generations".into(),
        }),
        Err(ProviderError::Network {
            endpoint: "images/generations".into(),
            message: "connection reset".into(),
        }),
    ]);
    let engine = orchestrator(
        Arc::new(InMemorySubmissionStore::new()),
        FakeAssets::with(&[]),
        provider.clone(),
        Duration::from_secs(60),
    );

    let result = engine
        .execute(&pipeline(vec![generation("g", 1, "x", vec![])]), &alice())
        .await;

    assert!(result.success);
    assert_eq!(provider.calls().len(), 3);
    assert_eq!(result.final_image.as_deref(), Some(&vec![3u8]));
}

#[tokio::test]
async fn test_process_submission_marks_completed_and_persists_output() {
    let store = Arc::new(InMemorySubmissionStore::new());
    store.insert(alice()).await;
    let assets = FakeAssets::with(&[]);
    let engine = orchestrator(
        store.clone(),
        assets.clone(),
        FakeProvider::new(),
        Duration::from_secs(60),
    );

    let result = engine
        .process_submission(&pipeline(vec![generation("g", 1, "x", vec![])]), "s-alice")
        .await
        .unwrap();

    assert!(result.success);
    let record = store.get("s-alice").await.unwrap();
    assert_eq!(record.status, SubmissionStatus::Completed);
    assert_eq!(record.output_ref.as_deref(), Some("fake://outputs/s-alice.png"));
    assert_eq!(assets.stores.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_process_submission_records_failure_code() {
    let store = Arc::new(InMemorySubmissionStore::new());
    store.insert(alice()).await;
    let engine = orchestrator(
        store.clone(),
        FakeAssets::with(&[]),
        FakeProvider::new(),
        Duration::from_secs(60),
    );

    let result = engine
        .process_submission(&pipeline(vec![]), "s-alice")
        .await
        .unwrap();

    assert!(!result.success);
    let record = store.get("s-alice").await.unwrap();
    assert_eq!(record.status, SubmissionStatus::Failed);
    assert_eq!(record.error_code, Some(ErrorCode::InvalidConfig));
    assert!(record.error_message.is_some());

    // 终态不可再次处理
    assert!(engine
        .process_submission(&pipeline(vec![]), "s-alice")
        .await
        .is_err());
}

#[tokio::test]
async fn test_concurrent_submissions_are_isolated() {
    let store = Arc::new(InMemorySubmissionStore::new());
    for name in ["Bob", "Carol", "Dave"] {
        let mut submission = alice();
        submission.id = format!("s-{}", name);
        submission.participant.name = Some(name.into());
        store.insert(submission).await;
    }
    let provider = FakeProvider::new();
    let engine = Arc::new(orchestrator(
        store.clone(),
        FakeAssets::with(&[]),
        provider.clone(),
        Duration::from_secs(60),
    ));
    let pipeline = Arc::new(pipeline(vec![generation("g", 1, "Hello {nom}", vec![])]));

    let handles: Vec<_> = ["Bob", "Carol", "Dave"]
        .into_iter()
        .map(|name| {
            let engine = engine.clone();
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                engine
                    .process_submission(&pipeline, &format!("s-{}", name))
                    .await
            })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert!(result.success);
    }

    let mut prompts: Vec<String> = provider.calls().into_iter().map(|c| c.prompt).collect();
    prompts.sort();
    assert_eq!(prompts, vec!["Hello Bob", "Hello Carol", "Hello Dave"]);
    for record in store.all().await {
        assert_eq!(record.status, SubmissionStatus::Completed);
    }
}
