mod test_splitter {
    use ragkit::{split_markdown_text, SplitOptions};

    #[test]
    fn test_two_level_header_scenario() {
        let fragments = split_markdown_text(
            "# A\ntext1\n## B\ntext2",
            &[("#", "h1"), ("##", "h2")],
            SplitOptions::default(),
        )
        .unwrap();

        assert_eq!(fragments.len(), 2);

        assert_eq!(fragments[0].page_content, "text1");
        assert_eq!(fragments[0].metadata["h1"], "A");
        assert!(!fragments[0].metadata.contains_key("h2"));

        assert_eq!(fragments[1].page_content, "text2");
        assert_eq!(fragments[1].metadata["h1"], "A");
        assert_eq!(fragments[1].metadata["h2"], "B");
    }

    #[test]
    fn test_fragments_cover_all_content_lines() {
        let text = "intro\n# One\nalpha\nbeta\n\n## Two\ngamma\n# Three\ndelta";
        let fragments = split_markdown_text(
            text,
            &[("#", "h1"), ("##", "h2")],
            SplitOptions {
                strip_headers: false,
                ..Default::default()
            },
        )
        .unwrap();

        let joined = fragments
            .iter()
            .map(|f| f.page_content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            assert!(joined.contains(line), "missing line {line:?}");
        }
    }

    #[test]
    fn test_failure_message_carries_original_error() {
        let err = split_markdown_text("# A\nx", &[("", "h1")], SplitOptions::default())
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("failed to split markdown document"));
        assert!(message.contains("header marker must not be empty"));
    }
}

mod test_generation {
    use async_trait::async_trait;
    use futures::StreamExt;
    use ragkit::{
        generate_response, generate_streaming_response, LanguageModel, LlmError, TokenStream,
    };

    /// Deterministic handle that replays a fixed chunk sequence.
    struct ChunkedModel {
        chunks: Vec<&'static str>,
    }

    #[async_trait]
    impl LanguageModel for ChunkedModel {
        async fn invoke(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(self.chunks.concat())
        }

        async fn invoke_stream(&self, _prompt: &str) -> Result<TokenStream, LlmError> {
            let items: Vec<Result<String, LlmError>> =
                self.chunks.iter().map(|c| Ok(c.to_string())).collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    /// Handle that yields two chunks and then fails.
    struct FailingModel;

    #[async_trait]
    impl LanguageModel for FailingModel {
        async fn invoke(&self, _prompt: &str) -> Result<String, LlmError> {
            Err(LlmError::Generation("connection reset".to_string()))
        }

        async fn invoke_stream(&self, _prompt: &str) -> Result<TokenStream, LlmError> {
            let items: Vec<Result<String, LlmError>> = vec![
                Ok("partial ".to_string()),
                Ok("output".to_string()),
                Err(LlmError::Generation("connection reset".to_string())),
            ];
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    /// Handle whose failures are not already generation-shaped.
    struct MisloadedModel;

    #[async_trait]
    impl LanguageModel for MisloadedModel {
        async fn invoke(&self, _prompt: &str) -> Result<String, LlmError> {
            Err(LlmError::ModelLoad {
                model: "ghost".to_string(),
                reason: "gone".to_string(),
            })
        }

        async fn invoke_stream(&self, _prompt: &str) -> Result<TokenStream, LlmError> {
            Err(LlmError::ModelLoad {
                model: "ghost".to_string(),
                reason: "gone".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_single_shot_is_identity_passthrough() {
        let model = ChunkedModel {
            chunks: vec!["hello", " ", "world"],
        };
        let response = generate_response("hi", &model).await.unwrap();
        assert_eq!(response, "hello world");
    }

    #[tokio::test]
    async fn test_stream_preserves_order_and_matches_single_shot() {
        let model = ChunkedModel {
            chunks: vec!["a", "b", "c"],
        };

        let stream = generate_streaming_response("hi", &model).await.unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec!["a", "b", "c"]);

        let single = generate_response("hi", &model).await.unwrap();
        assert_eq!(chunks.concat(), single);
    }

    #[tokio::test]
    async fn test_chunks_before_failure_stay_delivered() {
        let stream = generate_streaming_response("hi", &FailingModel).await.unwrap();
        let items: Vec<Result<String, LlmError>> = stream.collect().await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap(), "partial ");
        assert_eq!(items[1].as_ref().unwrap(), "output");
        let err = items[2].as_ref().unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_single_shot_failure_embeds_original_message() {
        let err = generate_response("hi", &FailingModel).await.unwrap_err();
        assert!(err.to_string().contains("error generating"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_foreign_errors_normalize_to_generation_kind() {
        let err = generate_response("hi", &MisloadedModel).await.unwrap_err();
        assert!(matches!(err, LlmError::Generation(_)));
        assert!(err.to_string().contains("ghost"));

        let err = match generate_streaming_response("hi", &MisloadedModel).await {
            Ok(_) => panic!("called `Result::unwrap_err()` on an `Ok` value"),
            Err(e) => e,
        };
        assert!(matches!(err, LlmError::Generation(_)));
    }
}

mod test_loaders {
    use ragkit::{load_llm_hf, load_llm_ollama, OllamaOptions, PipelineOptions};

    #[test]
    fn test_ollama_loader_failure_names_model() {
        let err = match load_llm_ollama("mistral", "::not a url::", OllamaOptions::default()) {
            Ok(_) => panic!("called `Result::unwrap_err()` on an `Ok` value"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("error loading model mistral"));
    }

    #[test]
    fn test_hf_loader_rejects_foreign_task() {
        let err = match load_llm_hf("gpt2", "image-classification", PipelineOptions::default()) {
            Ok(_) => panic!("called `Result::unwrap_err()` on an `Ok` value"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("error loading model gpt2"));
        assert!(err.to_string().contains("image-classification"));
    }
}
