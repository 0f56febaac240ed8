//! End-to-end tests for loader chain execution.

#[cfg(test)]
mod tests {
    use crate::core::{Content, PipelineRequest, UnitSpec};
    use crate::effects::SideEffectChannel;
    use crate::errors::{ConfigurationError, LoaderError, Phase, ProtocolViolation};
    use crate::events::{CollectingEventSink, MockEventSink};
    use crate::loaders::{Completion, FnLoader, Loader, PitchOutcome};
    use crate::pipeline::{CancellationToken, LoaderRunner, RunOptions, RunnerConfig};
    use crate::testing::{
        assert_cancelled, assert_emitted, assert_output_text, assert_protocol_violation,
        assert_unit_failure, async_upper, doubler, quiet_runner, quiet_runner_with, request,
        upper, CallLog, FailingLoader, HoldingLoader, RecordingLoader, SuspendingLoader,
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn recording(log: &CallLog, suffix: &str) -> RecordingLoader {
        RecordingLoader::new(log.clone(), suffix)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| (*item).to_string()).collect()
    }

    // Composition and short-circuit

    #[tokio::test]
    async fn test_sync_chain_composes_right_to_left() {
        let log = CallLog::new();
        let request = PipelineRequest::new("a.txt", "x")
            .with_unit("a", Arc::new(recording(&log, "a")))
            .with_unit("b", Arc::new(recording(&log, "b")))
            .with_unit("c", Arc::new(recording(&log, "c")));

        let result = quiet_runner().run(request).await.unwrap();

        assert_output_text(&result, "xcba");
        assert_eq!(result.short_circuit, None);
        assert_eq!(
            log.entries(),
            strings(&[
                "pitch:a",
                "pitch:b",
                "pitch:c",
                "transform:c",
                "transform:b",
                "transform:a",
            ])
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest_of_chain() {
        let log = CallLog::new();
        let request = PipelineRequest::new("a.txt", "raw")
            .with_unit("a", Arc::new(recording(&log, "-a")))
            .with_unit("b", Arc::new(recording(&log, "-b").short_circuit_with("X")))
            .with_unit("c", Arc::new(recording(&log, "-c")));

        let result = quiet_runner().run(request).await.unwrap();

        assert_output_text(&result, "X-a");
        assert_eq!(result.short_circuit, Some(1));
        assert_eq!(log.entries(), strings(&["pitch:a", "pitch:b", "transform:a"]));
    }

    #[tokio::test]
    async fn test_short_circuit_at_first_loader_is_the_output() {
        let log = CallLog::new();
        let request = PipelineRequest::new("a.txt", "raw")
            .with_unit("a", Arc::new(recording(&log, "-a").short_circuit_with("X")))
            .with_unit("b", Arc::new(recording(&log, "-b")));

        let result = quiet_runner().run(request).await.unwrap();

        assert_output_text(&result, "X");
        assert_eq!(result.short_circuit, Some(0));
        assert_eq!(log.entries(), strings(&["pitch:a"]));
    }

    #[tokio::test]
    async fn test_empty_chain_returns_raw_content() {
        let result = quiet_runner()
            .run(PipelineRequest::new("a.txt", "untouched"))
            .await
            .unwrap();

        assert_output_text(&result, "untouched");
        assert!(result.cacheable);
    }

    #[tokio::test]
    async fn test_doubler_then_async_upper() {
        let result = quiet_runner()
            .run(request(
                "a.txt",
                "ab",
                vec![("doubler", doubler()), ("asyncUpper", async_upper())],
            ))
            .await
            .unwrap();

        assert_output_text(&result, "ABAB");
    }

    // Suspension

    #[tokio::test]
    async fn test_suspension_matches_immediate_return() {
        let immediate = quiet_runner()
            .run(request("a.txt", "ab", vec![("upper", upper()), ("double", doubler())]))
            .await
            .unwrap();
        let suspended = quiet_runner()
            .run(request(
                "a.txt",
                "ab",
                vec![
                    ("upper", async_upper()),
                    (
                        "double",
                        Arc::new(SuspendingLoader::new(
                            |text| text.repeat(2),
                            Duration::from_millis(5),
                        )),
                    ),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(immediate.output, suspended.output);
        assert_output_text(&suspended, "ABAB");
    }

    #[tokio::test]
    async fn test_completion_before_return_is_accepted() {
        let eager = FnLoader::new(|input, ctx| {
            let completer = ctx.suspend()?;
            completer.succeed(input.to_text_lossy().to_uppercase())?;
            Ok(Completion::Suspended)
        });
        let result = quiet_runner()
            .run(PipelineRequest::new("a.txt", "ab").with_unit("eager", Arc::new(eager)))
            .await
            .unwrap();

        assert_output_text(&result, "AB");
    }

    #[tokio::test]
    async fn test_suspended_pitch_can_continue_or_short_circuit() {
        let proceeding = FnLoader::map_text(|text| format!("{text}!")).with_pitch(|_request, ctx| {
            let completer = ctx.suspend()?;
            tokio::spawn(async move {
                completer.proceed().expect("single completion");
            });
            Ok(Completion::Suspended)
        });
        let short_circuiting = FnLoader::map_text(|text| format!("{text}?")).with_pitch(|_request, ctx| {
            let completer = ctx.suspend()?;
            tokio::spawn(async move {
                completer.succeed("cached").expect("single completion");
            });
            Ok(Completion::Suspended)
        });
        let request = PipelineRequest::new("a.txt", "raw")
            .with_unit("a", Arc::new(proceeding))
            .with_unit("b", Arc::new(short_circuiting))
            .with_unit("c", Arc::new(FailingLoader::new("never runs")));

        let result = quiet_runner().run(request).await.unwrap();

        assert_output_text(&result, "cached!");
        assert_eq!(result.short_circuit, Some(1));
    }

    #[tokio::test]
    async fn test_async_failure_is_unit_failure() {
        let failing = FnLoader::new(|_input, ctx| {
            let completer = ctx.suspend()?;
            tokio::spawn(async move {
                completer
                    .fail(anyhow::anyhow!("disk on fire"))
                    .expect("single completion");
            });
            Ok(Completion::Suspended)
        });
        let err = quiet_runner()
            .run(PipelineRequest::new("a.txt", "x").with_unit("io", Arc::new(failing)))
            .await
            .unwrap_err();

        assert_unit_failure(&err, "io", Phase::Normal);
        assert!(err.to_string().contains("disk on fire"));
    }

    // Protocol violations

    #[tokio::test]
    async fn test_double_completion_is_protocol_violation() {
        let twice = FnLoader::new(|input, ctx| {
            let completer = ctx.suspend()?;
            completer.succeed(input.clone())?;
            assert!(completer.succeed(input).is_err());
            Ok(Completion::Suspended)
        });
        let err = quiet_runner()
            .run(PipelineRequest::new("a.txt", "x").with_unit("twice", Arc::new(twice)))
            .await
            .unwrap_err();

        assert_protocol_violation(&err);
        assert!(matches!(
            err,
            LoaderError::Protocol(ProtocolViolation::CompletedTwice { ref unit }) if unit == "twice"
        ));
    }

    #[tokio::test]
    async fn test_return_while_suspended_is_protocol_violation() {
        let confused = FnLoader::new(|input, ctx| {
            let _completer = ctx.suspend()?;
            Ok(Completion::Ready(input))
        });
        let err = quiet_runner()
            .run(PipelineRequest::new("a.txt", "x").with_unit("confused", Arc::new(confused)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoaderError::Protocol(ProtocolViolation::ReturnedWhileSuspended { .. })
        ));
    }

    #[tokio::test]
    async fn test_suspend_without_handle_is_protocol_violation() {
        let handleless = FnLoader::new(|_input, _ctx| Ok(Completion::Suspended));
        let err = quiet_runner()
            .run(PipelineRequest::new("a.txt", "x").with_unit("handleless", Arc::new(handleless)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoaderError::Protocol(ProtocolViolation::SuspendedWithoutHandle { .. })
        ));
    }

    #[tokio::test]
    async fn test_suspending_twice_is_protocol_violation() {
        let greedy = FnLoader::new(|_input, ctx| {
            let _first = ctx.suspend()?;
            let _second = ctx.suspend()?;
            Ok(Completion::Suspended)
        });
        let err = quiet_runner()
            .run(PipelineRequest::new("a.txt", "x").with_unit("greedy", Arc::new(greedy)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoaderError::Protocol(ProtocolViolation::SuspendedTwice { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_handle_is_abandoned() {
        let forgetful = FnLoader::new(|_input, ctx| {
            drop(ctx.suspend()?);
            Ok(Completion::Suspended)
        });
        let err = quiet_runner()
            .run(PipelineRequest::new("a.txt", "x").with_unit("forgetful", Arc::new(forgetful)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoaderError::Protocol(ProtocolViolation::Abandoned { .. })
        ));
    }

    #[tokio::test]
    async fn test_completion_timeout() {
        let holding = HoldingLoader::new();
        let channel = Arc::new(SideEffectChannel::new());
        let runner = quiet_runner_with(RunnerConfig::new().with_completion_timeout_ms(20));

        let err = runner
            .run_with(
                PipelineRequest::new("a.txt", "x").with_unit("slow", Arc::new(holding.clone())),
                RunOptions::new().with_channel(channel.clone()),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoaderError::Protocol(ProtocolViolation::Timeout { timeout_ms: 20, .. })
        ));
        assert_eq!(channel.errors().len(), 1);

        let completer = holding.take().unwrap();
        assert!(completer.succeed("too late").is_ok());
    }

    // Failures and side effects

    #[tokio::test]
    async fn test_unit_error_reports_phase_and_index() {
        let err = quiet_runner()
            .run(request(
                "a.txt",
                "x",
                vec![("ok", upper()), ("bad", Arc::new(FailingLoader::new("bad input")))],
            ))
            .await
            .unwrap_err();

        match err {
            LoaderError::Unit(failure) => {
                assert_eq!(failure.unit, "bad");
                assert_eq!(failure.index, 1);
                assert_eq!(failure.phase, Phase::Normal);
                assert!(failure.message.contains("bad input"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_pitch_error_fails_in_pitch_phase() {
        let failing_pitch = FnLoader::map_text(str::to_string)
            .with_pitch(|_request, _ctx| Err(anyhow::anyhow!("cannot pitch")));
        let err = quiet_runner()
            .run(PipelineRequest::new("a.txt", "x").with_unit("p", Arc::new(failing_pitch)))
            .await
            .unwrap_err();

        assert_unit_failure(&err, "p", Phase::Pitch);
    }

    #[tokio::test]
    async fn test_emitted_error_fails_run_and_keeps_side_effects() {
        let channel = Arc::new(SideEffectChannel::new());
        let reporter = FnLoader::new(|input, ctx| {
            ctx.emit_file("report.txt", "partial");
            ctx.add_dependency("src/dep.txt");
            ctx.emit_error("syntax error on line 3");
            Ok(Completion::Ready(input))
        });

        let err = quiet_runner()
            .run_with(
                PipelineRequest::new("a.txt", "x").with_unit("lint", Arc::new(reporter)),
                RunOptions::new().with_channel(channel.clone()),
            )
            .await
            .unwrap_err();

        assert_unit_failure(&err, "lint", Phase::Normal);
        assert_eq!(channel.emitted_files().len(), 1);
        assert_eq!(channel.errors()[0].message, "syntax error on line 3");
        assert!(channel.resource_dependencies().contains("src/dep.txt"));
    }

    #[tokio::test]
    async fn test_emitted_file_collision_keeps_last_write() {
        let emitter = |content: &'static str| {
            Arc::new(FnLoader::new(move |input, ctx| {
                ctx.emit_file("[name].map", content);
                Ok(Completion::Ready(input))
            })) as Arc<dyn Loader>
        };

        let result = quiet_runner()
            .run(request(
                "src/app.js",
                "code",
                vec![("first", emitter("from first")), ("second", emitter("from second"))],
            ))
            .await
            .unwrap();

        // The normal phase runs "second" before "first".
        assert_eq!(result.emitted_files.len(), 1);
        assert_emitted(&result, "app.map", "from first");
        assert_eq!(result.emitted_files[0].unit_identifier, "first");
    }

    #[tokio::test]
    async fn test_side_effects_are_collected() {
        let loader = FnLoader::new(|input, ctx| {
            let name = ctx.emit_file("[name].[md5:hash:hex:8].txt", "hello");
            assert_eq!(name, "logo.5d41402a.txt");
            ctx.emit_warning("deprecated syntax");
            ctx.add_dependency("src/b.css");
            ctx.add_dependency("src/a.css");
            ctx.add_auxiliary_dependency("src/partials");
            Ok(Completion::Ready(input))
        });

        let result = quiet_runner()
            .run(PipelineRequest::new("img/logo.png", "x").with_unit("fx", Arc::new(loader)))
            .await
            .unwrap();

        assert_emitted(&result, "logo.5d41402a.txt", "hello");
        assert_eq!(result.warnings().count(), 1);
        assert_eq!(
            result.resource_dependencies.iter().cloned().collect::<Vec<_>>(),
            strings(&["src/a.css", "src/b.css"])
        );
        assert!(result.auxiliary_dependencies.contains("src/partials"));
    }

    // Cacheability

    #[tokio::test]
    async fn test_cleared_cacheable_flag_cannot_be_restored() {
        let volatile = FnLoader::new(|input, ctx| {
            ctx.set_cacheable(false);
            Ok(Completion::Ready(input))
        });
        let optimistic = FnLoader::new(|input, ctx| {
            ctx.set_cacheable(true);
            Ok(Completion::Ready(input))
        });

        let result = quiet_runner()
            .run(request(
                "a.txt",
                "x",
                vec![("optimistic", Arc::new(optimistic)), ("volatile", Arc::new(volatile))],
            ))
            .await
            .unwrap();

        assert!(!result.cacheable);
    }

    #[tokio::test]
    async fn test_non_cacheable_loader_clears_flag() {
        let result = quiet_runner()
            .run(PipelineRequest::new("a.txt", "x").with_unit(
                "now",
                Arc::new(FnLoader::map_text(str::to_string).not_cacheable()),
            ))
            .await
            .unwrap();

        assert!(!result.cacheable);
    }

    // Cancellation

    #[tokio::test]
    async fn test_cancellation_while_suspended() {
        let holding = HoldingLoader::new();
        let token = CancellationToken::new();
        let runner = quiet_runner();

        let run = runner.run_with(
            PipelineRequest::new("a.txt", "x").with_unit("slow", Arc::new(holding.clone())),
            RunOptions::new().with_cancellation(token.clone()),
        );
        let cancel = async {
            tokio::task::yield_now().await;
            token.cancel("resource changed");
        };

        let (outcome, ()) = tokio::join!(run, cancel);
        let err = outcome.unwrap_err();

        assert_cancelled(&err);
        assert!(err.to_string().contains("resource changed"));

        let completer = holding.take().unwrap();
        assert!(completer.succeed("late").is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let log = CallLog::new();
        let token = CancellationToken::new();
        token.cancel("stale");

        let err = quiet_runner()
            .run_with(
                PipelineRequest::new("a.txt", "x").with_unit("a", Arc::new(recording(&log, "a"))),
                RunOptions::new().with_cancellation(token),
            )
            .await
            .unwrap_err();

        assert_cancelled(&err);
        assert!(log.entries().is_empty());
    }

    // Content modes, options and forwarded data

    #[tokio::test]
    async fn test_raw_loader_receives_bytes() {
        let raw = FnLoader::new(|input, _ctx| {
            assert!(matches!(input, Content::Bytes(_)));
            Ok(Completion::Ready(Content::from(input.len().to_string())))
        })
        .raw();

        let result = quiet_runner()
            .run(request("a.bin", "héllo", vec![("size", Arc::new(raw)), ("upper", upper())]))
            .await
            .unwrap();

        assert_output_text(&result, "6");
    }

    #[tokio::test]
    async fn test_text_loader_decodes_bytes() {
        let result = quiet_runner()
            .run(PipelineRequest::new("a.txt", b"abc".to_vec()).with_unit("upper", upper()))
            .await
            .unwrap();

        assert_eq!(result.output, Content::Text("ABC".to_string()));
    }

    #[tokio::test]
    async fn test_forwarded_data_reaches_later_pitches_and_transforms() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = FnLoader::map_text(str::to_string).with_pitch(|request, _ctx| {
            request
                .forwarded
                .insert("hint".to_string(), serde_json::json!("from-first"));
            Ok(Completion::Ready(PitchOutcome::Continue))
        });

        let pitch_seen = seen.clone();
        let transform_seen = seen.clone();
        let second = FnLoader::new(move |input, ctx| {
            let hint = ctx.forwarded_data().get("hint").cloned();
            transform_seen.lock().push(format!("transform:{hint:?}"));
            Ok(Completion::Ready(input))
        })
        .with_pitch(move |request, _ctx| {
            let hint = request.forwarded.get("hint").cloned();
            pitch_seen.lock().push(format!("pitch:{hint:?}"));
            pitch_seen.lock().push(request.remaining_request());
            pitch_seen.lock().push(request.preceding_request());
            Ok(Completion::Ready(PitchOutcome::Continue))
        });

        let request = PipelineRequest::new("src/a.css", "x")
            .with_unit("first", Arc::new(first))
            .with_unit("second", Arc::new(second))
            .with_loader(
                UnitSpec::new("third").with_option("modules", serde_json::json!(true)),
                upper(),
            );
        quiet_runner().run(request).await.unwrap();

        assert_eq!(
            *seen.lock(),
            strings(&[
                r#"pitch:Some(String("from-first"))"#,
                r#"third?{"modules":true}!src/a.css"#,
                "first",
                r#"transform:Some(String("from-first"))"#,
            ])
        );
    }

    #[derive(Debug, serde::Deserialize)]
    struct BannerOptions {
        banner: String,
    }

    #[tokio::test]
    async fn test_options_are_deserialized() {
        let banner = FnLoader::new(|input, ctx| {
            let options: BannerOptions = ctx.options_as()?;
            Ok(Completion::Ready(Content::Text(format!(
                "{}{}",
                options.banner,
                input.to_text_lossy()
            ))))
        });
        let spec = UnitSpec::new("banner").with_option("banner", serde_json::json!("/* hi */"));

        let result = quiet_runner()
            .run(PipelineRequest::new("a.css", "body{}").with_loader(spec, Arc::new(banner)))
            .await
            .unwrap();

        assert_output_text(&result, "/* hi */body{}");
    }

    #[tokio::test]
    async fn test_invalid_options_fail_the_loader() {
        let banner = FnLoader::new(|input, ctx| {
            let _options: BannerOptions = ctx.options_as()?;
            Ok(Completion::Ready(input))
        });

        let err = quiet_runner()
            .run(PipelineRequest::new("a.css", "body{}").with_unit("banner", Arc::new(banner)))
            .await
            .unwrap_err();

        assert_unit_failure(&err, "banner", Phase::Normal);
        assert!(err.to_string().contains("banner"));
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected() {
        let err = quiet_runner()
            .run(PipelineRequest::new("  ", "x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoaderError::Configuration(ConfigurationError::EmptyResource)
        ));

        let err = quiet_runner()
            .run(request("a.txt", "x", vec![("ok", upper()), ("", upper())]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoaderError::Configuration(ConfigurationError::EmptyIdentifier { index: 1 })
        ));
    }

    // Events

    #[tokio::test]
    async fn test_events_follow_run_lifecycle() {
        let sink = Arc::new(CollectingEventSink::new());
        let runner = LoaderRunner::new().with_event_sink(sink.clone());

        let result = runner
            .run(request("a.txt", "x", vec![("a", upper()), ("b", doubler())]))
            .await
            .unwrap();

        assert_eq!(
            sink.event_types(),
            strings(&[
                "run.started",
                "loader.pitched",
                "loader.pitched",
                "loader.transformed",
                "loader.transformed",
                "run.completed",
            ])
        );
        let (_, data) = &sink.events()[0];
        let data = data.as_ref().unwrap();
        assert_eq!(data["run_id"], serde_json::json!(result.run_id.to_string()));
        assert_eq!(data["loaders"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn test_events_can_be_disabled() {
        let sink = Arc::new(CollectingEventSink::new());
        let runner = LoaderRunner::with_config(RunnerConfig::new().with_events(false))
            .with_event_sink(sink.clone());

        runner
            .run(request("a.txt", "x", vec![("a", upper())]))
            .await
            .unwrap();

        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_failed_run_emits_failure_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();

        let mut sink = MockEventSink::new();
        sink.expect_try_emit()
            .times(3)
            .returning(move |event_type, _data| recorded.lock().push(event_type.to_string()));

        let runner = LoaderRunner::new().with_event_sink(Arc::new(sink));
        let err = runner
            .run(PipelineRequest::new("a.txt", "x").with_unit("bad", Arc::new(FailingLoader::new("nope"))))
            .await;

        tokio_test::assert_err!(err);
        assert_eq!(
            *seen.lock(),
            strings(&["run.started", "loader.pitched", "run.failed"])
        );
    }

    #[test]
    fn test_runner_on_blocking_executor() {
        let result = tokio_test::block_on(
            quiet_runner().run(request("a.txt", "ab", vec![("double", doubler())])),
        );

        let result = tokio_test::assert_ok!(result);
        assert_output_text(&result, "abab");
        assert!(result.duration_ms >= 0.0);
    }
}
