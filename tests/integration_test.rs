//! End-to-end pipeline tests: ticks in, position and history out.

mod common;

use common::*;
use proptest::prelude::*;
use scalpwatch::adapters::memory_history_adapter::MemoryHistoryAdapter;
use scalpwatch::domain::config::PipelineConfig;
use scalpwatch::domain::error::ScalpwatchError;
use scalpwatch::domain::history::{HistoryParams, HistoryQuery, HistoryResult, RecordEvent};
use scalpwatch::domain::indicator::IndicatorKind;
use scalpwatch::domain::pipeline::{CandleReport, Pipeline};
use scalpwatch::domain::position::{ExitReason, Position, PositionEvent, Side};
use scalpwatch::domain::signal::Direction;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn opened_at(reports: &[CandleReport]) -> Vec<usize> {
    reports
        .iter()
        .enumerate()
        .filter(|(_, r)| r.events.iter().any(|e| matches!(e, PositionEvent::Opened(_))))
        .map(|(i, _)| i)
        .collect()
}

fn direction(report: &CandleReport, kind: IndicatorKind) -> Direction {
    report
        .score
        .breakdown
        .iter()
        .find(|c| c.indicator == kind)
        .map(|c| c.direction)
        .unwrap()
}

mod rising_market {
    use super::*;

    #[test]
    fn ema200_becomes_available_at_candle_200() {
        let (mut pipeline, _) = memory_pipeline(PipelineConfig::default());
        let reports = ingest_all(&mut pipeline, &rising_ticks(260));
        assert_eq!(reports.len(), 260);

        let ema = |r: &CandleReport| {
            r.readings
                .iter()
                .find(|x| x.kind == IndicatorKind::Ema200)
                .unwrap()
                .is_available()
        };
        assert!(reports[..199].iter().all(|r| !ema(r)));
        assert!(reports[199..].iter().all(ema));
    }

    #[test]
    fn trend_indicators_are_bullish_by_candle_230() {
        let (mut pipeline, _) = memory_pipeline(PipelineConfig::default());
        let reports = ingest_all(&mut pipeline, &rising_ticks(260));
        let r = &reports[229];
        assert_eq!(direction(r, IndicatorKind::Macd), Direction::Bullish);
        assert_eq!(direction(r, IndicatorKind::EmaCross), Direction::Bullish);
        assert!(r.score.composite_score >= 0.6);
    }

    #[test]
    fn opens_long_at_triggering_candle_close() {
        let (mut pipeline, store) = memory_pipeline(PipelineConfig::default());
        let reports = ingest_all(&mut pipeline, &rising_ticks(260));

        let opened = opened_at(&reports);
        assert_eq!(opened, vec![199]);
        let trigger = &reports[199];
        assert!(trigger.score.composite_score >= 0.6);
        assert!(reports[..199].iter().all(|r| r.score.composite_score < 0.6));

        let PositionEvent::Opened(position) = &trigger.events[0] else {
            panic!("expected an open event");
        };
        assert_eq!(position.side, Side::Long);
        assert_eq!(position.entry_price, trigger.candle.close);
        assert!(position.stop_loss < position.entry_price);
        assert!(position.take_profit > position.entry_price);

        let view = pipeline.query_handle().current_position().unwrap();
        assert_eq!(view.position.opened_at, trigger.candle.close_time);
        assert!(view.unrealized_pnl > 0.0);

        let entry = find_record(&all_history(store.as_ref()), trigger.record.id);
        assert_eq!(entry.event, RecordEvent::PositionOpened);
        assert_eq!(entry.open_price, Some(trigger.candle.close));
        assert_eq!(entry.result, HistoryResult::Pending);
    }

    #[test]
    fn stops_and_targets_only_move_in_favor() {
        let (mut pipeline, _) = memory_pipeline(PipelineConfig::default());
        let query = pipeline.query_handle();
        let mut last: Option<(f64, f64)> = None;
        for t in rising_ticks(260) {
            if pipeline.ingest(&t).unwrap().is_none() {
                continue;
            }
            if let Some(view) = query.current_position() {
                let levels = (view.position.stop_loss, view.position.take_profit);
                if let Some((stop, take)) = last {
                    assert!(levels.0 >= stop, "stop moved down: {} -> {}", stop, levels.0);
                    assert!(levels.1 >= take, "target moved down: {} -> {}", take, levels.1);
                }
                last = Some(levels);
            }
        }
        assert!(last.is_some());
    }
}

mod stop_loss {
    use super::*;

    /// Enter on the ramp, then crash through the stop on the next candle.
    fn enter_then_crash() -> (Pipeline, Arc<MemoryHistoryAdapter>, f64, CandleReport, CandleReport) {
        let (mut pipeline, store) = memory_pipeline(PipelineConfig::default());
        let reports = ingest_all(&mut pipeline, &rising_ticks(200));
        let entry = reports[199].clone();
        let stop = pipeline.query_handle().current_position().unwrap().position.stop_loss;

        let crash = ingest_all(&mut pipeline, &[tick(200 * 60 + 30, 900.0), tick(201 * 60, 900.0)]);
        assert_eq!(crash.len(), 1);
        (pipeline, store, stop, entry, crash[0].clone())
    }

    #[test]
    fn exits_at_stop_level_not_candle_low() {
        let (pipeline, _, stop, entry, crash) = enter_then_crash();
        assert_eq!(crash.candle.low, 900.0);

        let closed = crash
            .events
            .iter()
            .find_map(|e| match e {
                PositionEvent::Closed(t) => Some(t.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(closed.reason, ExitReason::StopLoss);
        assert_eq!(closed.exit_price, stop);
        assert_eq!(closed.entry_price, entry.candle.close);
        assert!(closed.pnl < 0.0);

        let query = pipeline.query_handle();
        assert!(query.current_position().is_none());
        let capital = query.capital();
        assert_eq!(capital.trades, 1);
        assert_eq!(capital.wins, 0);
        assert!((capital.realized_pnl - closed.pnl).abs() < 1e-9);
    }

    #[test]
    fn entry_and_close_records_resolve_as_failure() {
        let (_, store, stop, entry, crash) = enter_then_crash();
        let page = all_history(store.as_ref());

        let close = find_record(&page, crash.record.id);
        assert_eq!(close.event, RecordEvent::PositionClosed);
        assert_eq!(close.result, HistoryResult::Failure);
        assert_eq!(close.close_price, Some(stop));

        let opened = find_record(&page, entry.record.id);
        assert_eq!(opened.result, HistoryResult::Failure);
        assert_eq!(opened.close_price, Some(stop));
    }

    #[test]
    fn terminal_records_never_change() {
        let (mut pipeline, store, _, _, _) = enter_then_crash();
        let before = terminal(&all_history(store.as_ref()));
        assert!(!before.is_empty());

        let more: Vec<_> = (0..40)
            .map(|i| tick(201 * 60 + 30 + i * 30, 900.0 + (i % 7) as f64))
            .collect();
        ingest_all(&mut pipeline, &more);

        let after = all_history(store.as_ref());
        for record in before {
            assert_eq!(find_record(&after, record.id), record);
        }
    }
}

mod manual_close {
    use super::*;

    #[test]
    fn closes_at_latest_price_and_records_it() {
        let (mut pipeline, store) = memory_pipeline(PipelineConfig::default());
        ingest_all(&mut pipeline, &rising_ticks(205));
        let latest = pipeline.query_handle().latest_price().unwrap();

        let trade = pipeline.close_position().unwrap().unwrap();
        assert_eq!(trade.reason, ExitReason::Manual);
        assert_eq!(trade.exit_price, latest.price);
        assert_eq!(trade.closed_at, latest.timestamp);
        assert!(pipeline.query_handle().current_position().is_none());

        let page = all_history(store.as_ref());
        let newest = &page.records[0];
        assert_eq!(newest.signal_name, "manual_close");
        assert_eq!(newest.event, RecordEvent::PositionClosed);
        assert_eq!(newest.close_price, Some(latest.price));

        assert_eq!(pipeline.close_position().unwrap(), None);
    }
}

mod ordering {
    use super::*;

    #[test]
    fn out_of_order_tick_leaves_state_unchanged() {
        let (mut pipeline, store) = memory_pipeline(PipelineConfig::default());
        ingest_all(&mut pipeline, &rising_ticks(30));
        let query = pipeline.query_handle();
        let before = query.snapshot();
        let history_before = all_history(store.as_ref());

        let late = tick(10 * 60, 5000.0);
        let err = pipeline.ingest(&late).unwrap_err();
        assert!(matches!(err, ScalpwatchError::OutOfOrderTick { .. }));

        let after = query.snapshot();
        assert_eq!(after.latest, before.latest);
        assert_eq!(after.score, before.score);
        assert_eq!(after.signals, before.signals);
        assert_eq!(after.position, before.position);
        assert_eq!(after.candles, before.candles);
        assert_eq!(after.health.rejected_ticks, before.health.rejected_ticks + 1);
        assert_eq!(all_history(store.as_ref()), history_before);

        // The feed carries on where it left off.
        assert!(pipeline.ingest(&tick(30 * 60 + 30, 1100.0)).is_ok());
    }

    #[test]
    fn duplicate_timestamp_is_rejected() {
        let (mut pipeline, _) = memory_pipeline(PipelineConfig::default());
        pipeline.ingest(&tick(60, 100.0)).unwrap();
        assert!(matches!(
            pipeline.ingest(&tick(60, 101.0)),
            Err(ScalpwatchError::OutOfOrderTick { .. })
        ));
    }
}

mod history_queries {
    use super::*;

    #[test]
    fn repeated_queries_are_identical() {
        let (mut pipeline, _) = memory_pipeline(PipelineConfig::default());
        ingest_all(&mut pipeline, &rising_ticks(120));
        let query = pipeline.query_handle();
        let q = HistoryQuery {
            from: Some(at(30 * 60)),
            to: Some(at(90 * 60)),
            limit: 20,
            offset: 5,
        };
        let first = query.signal_history(&q).unwrap();
        let second = query.signal_history(&q).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.records.len(), 20);
        assert!(first.has_more);
        assert!(first
            .records
            .windows(2)
            .all(|w| w[0].timestamp >= w[1].timestamp));
        assert!(first.records.iter().all(|r| q.contains(r.timestamp)));
    }

    #[test]
    fn strong_evaluations_resolve_after_horizon() {
        let mut config = PipelineConfig::default();
        config.history = HistoryParams {
            horizon_candles: 5,
            ..HistoryParams::default()
        };
        let (mut pipeline, store) = memory_pipeline(config);
        let reports = ingest_all(&mut pipeline, &rising_ticks(120));
        let page = all_history(store.as_ref());

        let strong = reports
            .iter()
            .take(100)
            .find(|r| r.score.composite_score.abs() >= 0.2)
            .unwrap();
        let resolved = find_record(&page, strong.record.id);
        assert_eq!(resolved.result, HistoryResult::Success);
        assert!(resolved.close_price.unwrap() > strong.candle.close);
    }
}

mod persistence {
    use super::*;

    fn flaky_pipeline() -> (Pipeline, Arc<FlakyHistory>) {
        let store = Arc::new(FlakyHistory::default());
        let mut config = PipelineConfig::default();
        config.history.retry_backoff_ms = 0;
        config.history.max_retries = 1;
        let pipeline = Pipeline::new(config, store.clone(), Box::new(RecordingNotifier::default()))
            .unwrap();
        (pipeline, store)
    }

    #[test]
    fn failing_store_degrades_health_and_recovers() {
        let (mut pipeline, store) = flaky_pipeline();
        let query = pipeline.query_handle();
        ingest_all(&mut pipeline, &rising_ticks(10));
        assert_eq!(all_history(store.as_ref()).records.len(), 10);

        store.set_failing(true);
        let outage = ingest_all(&mut pipeline, &[
            tick(10 * 60 + 30, 1020.0),
            tick(11 * 60, 1021.0),
            tick(12 * 60, 1022.0),
        ]);
        assert_eq!(outage.len(), 2);
        let health = query.health();
        assert!(health.degraded);
        assert_eq!(health.history.buffered, 2);
        assert!(health.history.write_failures >= 1);
        assert!(health.history.last_error.is_some());
        assert_eq!(all_history(store.as_ref()).records.len(), 10);

        store.set_failing(false);
        ingest_all(&mut pipeline, &[tick(13 * 60, 1023.0)]);
        let health = query.health();
        assert_eq!(health.history.buffered, 0);
        assert!(!health.degraded);

        let ids: Vec<u64> = all_history(store.as_ref()).records.iter().map(|r| r.id).collect();
        assert_eq!(ids, (1..=13).rev().collect::<Vec<u64>>());
    }

    #[test]
    fn new_recorder_continues_numbering() {
        let store = Arc::new(FlakyHistory::default());
        {
            let mut pipeline = Pipeline::new(
                PipelineConfig::default(),
                store.clone(),
                Box::new(RecordingNotifier::default()),
            )
            .unwrap();
            ingest_all(&mut pipeline, &rising_ticks(5));
        }
        let mut pipeline = Pipeline::new(
            PipelineConfig::default(),
            store.clone(),
            Box::new(RecordingNotifier::default()),
        )
        .unwrap();
        let reports = ingest_all(&mut pipeline, &rising_ticks(2));
        assert_eq!(reports[0].record.id, 6);
    }
}

mod concurrency {
    use super::*;

    #[test]
    fn readers_always_see_consistent_snapshots() {
        let (mut pipeline, _) = memory_pipeline(PipelineConfig::default());
        let query = pipeline.query_handle();
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let query = query.clone();
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let mut reads = 0u64;
                while !done.load(Ordering::SeqCst) {
                    let snapshot = query.snapshot();
                    if let Some(score) = &snapshot.score {
                        let sum: f64 = score.breakdown.iter().map(|c| c.contribution).sum();
                        assert!((sum.clamp(-1.0, 1.0) - score.composite_score).abs() < 1e-9);
                        assert_eq!(snapshot.signals.len(), score.breakdown.len());
                    }
                    if let (Some(view), Some(latest)) = (&snapshot.position, snapshot.latest) {
                        assert_eq!(view.mark_price, latest.price);
                    }
                    reads += 1;
                }
                reads
            })
        };

        ingest_all(&mut pipeline, &rising_ticks(260));
        done.store(true, Ordering::SeqCst);
        assert!(reader.join().unwrap() > 0);
        assert_eq!(query.snapshot().candles, 260);
    }
}

fn replay(closes: &[f64]) -> Vec<CandleReport> {
    let (mut pipeline, _) = memory_pipeline(PipelineConfig::default());
    ingest_all(&mut pipeline, &ticks_from_closes(closes))
}

fn walk() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-8.0..8.0_f64, 30..320).prop_map(|steps| {
        let mut price = 1000.0;
        steps
            .into_iter()
            .map(|s| {
                price = (price + s).max(10.0);
                price
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Replaying the same candles from empty state gives identical output.
    #[test]
    fn replay_is_deterministic(closes in walk()) {
        let a = replay(&closes);
        let b = replay(&closes);
        prop_assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            prop_assert_eq!(&x.readings, &y.readings);
            prop_assert_eq!(&x.score, &y.score);
            prop_assert_eq!(&x.events, &y.events);
        }
    }

    #[test]
    fn score_and_rsi_stay_in_range(closes in walk()) {
        for report in replay(&closes) {
            prop_assert!((-1.0..=1.0).contains(&report.score.composite_score));
            let weights: f64 = report.score.breakdown.iter().map(|c| c.weight).sum();
            prop_assert!((weights - 1.0).abs() < 1e-6);
            let rsi = report
                .readings
                .iter()
                .find(|r| r.kind == IndicatorKind::Rsi)
                .and_then(|r| r.simple());
            if let Some(rsi) = rsi {
                prop_assert!((0.0..=100.0).contains(&rsi));
            }
        }
    }

    #[test]
    fn levels_only_move_in_favor(closes in walk()) {
        let (mut pipeline, _) = memory_pipeline(PipelineConfig::default());
        let query = pipeline.query_handle();
        let mut last: Option<Position> = None;
        for t in ticks_from_closes(&closes) {
            if pipeline.ingest(&t).unwrap().is_none() {
                continue;
            }
            let current = query.current_position().map(|v| v.position);
            if let (Some(prev), Some(now)) = (&last, &current) {
                if prev.opened_at == now.opened_at && prev.side == now.side {
                    let sign = now.side.sign();
                    prop_assert!((now.stop_loss - prev.stop_loss) * sign >= 0.0);
                    prop_assert!((now.take_profit - prev.take_profit) * sign >= 0.0);
                }
            }
            last = current;
        }
    }

    #[test]
    fn weights_renormalize_after_toggles(mask in prop::collection::vec(any::<bool>(), 8)) {
        let (mut pipeline, _) = memory_pipeline(PipelineConfig::default());
        ingest_all(&mut pipeline, &rising_ticks(40));
        for (kind, on) in IndicatorKind::ALL.into_iter().zip(mask) {
            // Disabling the last enabled indicator is refused; that is fine here.
            let _ = pipeline.set_indicator_enabled(kind, on);
        }
        let score = pipeline.query_handle().current_score().unwrap();
        let total: f64 = score.breakdown.iter().map(|c| c.weight).sum();
        prop_assert!(!score.breakdown.is_empty());
        prop_assert!((total - 1.0).abs() < 1e-6);
        prop_assert!((-1.0..=1.0).contains(&score.composite_score));
    }
}
