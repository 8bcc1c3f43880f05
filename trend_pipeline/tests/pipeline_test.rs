mod common;

use std::sync::Arc;

use common::{BatchMode, MockCalendar, MockMarket, SingleMode, config, d};
use trend_pipeline::{
    Error, PipelineOrchestrator,
    config::PipelineConfig,
    models::{Direction, InstrumentCode, Provenance},
    synthetic::SyntheticDataGenerator,
};

fn week_after_oct_10() -> Vec<chrono::NaiveDate> {
    vec![d(10, 13), d(10, 14), d(10, 15), d(10, 16), d(10, 17)]
}

fn full_week(market: MockMarket, ts_code: &str) -> MockMarket {
    week_after_oct_10()
        .into_iter()
        .enumerate()
        .fold(market, |m, (i, day)| m.row(ts_code, day, i as f64 - 1.5))
}

fn pipeline(
    calendar: Arc<MockCalendar>,
    market: Arc<MockMarket>,
    config: &PipelineConfig,
) -> PipelineOrchestrator {
    PipelineOrchestrator::with_providers(calendar, market, config).unwrap()
}

fn generator(config: &PipelineConfig) -> SyntheticDataGenerator {
    SyntheticDataGenerator::from_config(&config.synthetic).unwrap()
}

#[tokio::test(start_paused = true)]
async fn second_call_is_served_from_cache() {
    let market = full_week(MockMarket::new(BatchMode::Serve, SingleMode::Serve), "600519.SH").build();
    let p = pipeline(MockCalendar::empty(), market.clone(), &config());

    let first = p.get_performance("600519", "2025-10-10", 5).await.unwrap();
    assert_eq!(first.dates().collect::<Vec<_>>(), week_after_oct_10());
    assert!(first.is_complete_real());
    assert_eq!(market.batch_calls(), 1);
    assert_eq!(market.single_calls(), 0);
    assert_eq!(p.cache_stats().performance.writes, 1);

    let second = p.get_performance("600519", "2025-10-10", 5).await.unwrap();
    assert_eq!(second.values(), first.values());
    assert_eq!(market.batch_calls(), 1);
    assert_eq!(market.single_calls(), 0);
    let stats = p.cache_stats().performance;
    assert_eq!(stats.writes, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test(start_paused = true)]
async fn hybrid_fill_matches_synthetic_generator() {
    let cfg = config();
    let market = full_week(MockMarket::new(BatchMode::Throttled, SingleMode::Throttled), "600519.SH")
        .script(vec![SingleMode::Serve, SingleMode::Serve])
        .build();
    let p = pipeline(MockCalendar::empty(), market.clone(), &cfg);

    let record = p.get_performance("600519", "2025-10-10", 5).await.unwrap();
    assert_eq!(record.len(), 5);
    assert_eq!(record.real_count(), 2);
    assert_eq!(record.synthetic_count(), 3);
    assert_eq!(record.value(d(10, 13)), Some(-1.5));
    assert_eq!(record.value(d(10, 14)), Some(-0.5));

    let id = InstrumentCode::parse("600519").unwrap();
    let expected = generator(&cfg).generate(&id, &week_after_oct_10());
    for day in [d(10, 15), d(10, 16), d(10, 17)] {
        assert_eq!(record.point(day), expected.point(day), "{day}");
    }

    // cached wholesale, hybrid included
    let calls = market.single_calls();
    let again = p.get_performance("600519", "2025-10-10", 5).await.unwrap();
    assert_eq!(again, record);
    assert_eq!(market.single_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn total_failure_is_replaced_with_synthetic_values() {
    let cfg = config();
    let market = MockMarket::new(BatchMode::Broken, SingleMode::Broken).build();
    let p = pipeline(MockCalendar::empty(), market.clone(), &cfg);

    let record = p.get_performance("300750", "2025-10-10", 5).await.unwrap();
    assert_eq!(record.real_count(), 0);
    assert_eq!(record.synthetic_count(), 5);

    let id = InstrumentCode::parse("300750").unwrap();
    assert_eq!(record, generator(&cfg).generate(&id, &week_after_oct_10()));
    assert!(record.values().values().all(|v| v.abs() <= 8.0));
    // one batch, then one single per day; none of them rate limited
    assert_eq!(market.batch_calls(), 1);
    assert_eq!(market.single_calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn total_failure_stays_zero_when_synthesis_is_off() {
    let mut cfg = config();
    cfg.pipeline.synthesize_on_total_failure = false;
    let market = MockMarket::new(BatchMode::Broken, SingleMode::Broken).build();
    let p = pipeline(MockCalendar::empty(), market, &cfg);

    let record = p.get_performance("600519", "2025-10-10", 5).await.unwrap();
    assert_eq!(record.no_data_dates(), week_after_oct_10());
    assert!(record.values().values().all(|v| *v == 0.0));
}

#[tokio::test(start_paused = true)]
async fn days_after_today_are_zero() {
    let mut cfg = config();
    cfg.synthetic.today = Some(d(10, 15));
    let market = MockMarket::new(BatchMode::Broken, SingleMode::Broken).build();
    let p = pipeline(MockCalendar::empty(), market, &cfg);

    let record = p.get_performance("600519", "2025-10-10", 5).await.unwrap();
    assert_eq!(record.synthetic_count(), 3);
    assert_eq!(record.no_data_dates(), vec![d(10, 16), d(10, 17)]);
    assert_eq!(record.value(d(10, 17)), Some(0.0));
}

#[tokio::test(start_paused = true)]
async fn exchange_holidays_shift_the_horizon() {
    let golden_week = (1..=8).map(|day| d(10, day)).collect();
    let market = MockMarket::new(BatchMode::Serve, SingleMode::Serve).build();
    let p = pipeline(MockCalendar::with_holidays(golden_week), market, &config());

    let days = p
        .resolve_trading_days("2025-09-30", 5, Direction::Forward)
        .await
        .unwrap();
    assert_eq!(days, vec![d(10, 9), d(10, 10), d(10, 13), d(10, 14), d(10, 15)]);
}

#[tokio::test(start_paused = true)]
async fn trailing_week_ends_on_anchor() {
    let market = MockMarket::new(BatchMode::Serve, SingleMode::Serve)
        .row("000001.SZ", d(10, 14), 0.8)
        .build();
    let p = pipeline(MockCalendar::empty(), market, &config());

    let record = p.get_trailing_week("000001", "2025-10-14").await.unwrap();
    assert_eq!(
        record.dates().collect::<Vec<_>>(),
        vec![d(10, 8), d(10, 9), d(10, 10), d(10, 13), d(10, 14)]
    );
    assert_eq!(record.value(d(10, 14)), Some(0.8));
    assert_eq!(record.provenance(d(10, 8)), Some(Provenance::NoData));
}

#[tokio::test(start_paused = true)]
async fn explicit_dates() {
    let market = full_week(MockMarket::new(BatchMode::Serve, SingleMode::Serve), "600519.SH").build();
    let p = pipeline(MockCalendar::empty(), market.clone(), &config());

    let record = p
        .get_instrument_performance("600519.SH", &["2025-10-17", "20251013"])
        .await
        .unwrap();
    assert_eq!(record.dates().collect::<Vec<_>>(), vec![d(10, 13), d(10, 17)]);
    assert!(record.is_complete_real());

    let empty: [&str; 0] = [];
    let record = p.get_instrument_performance("600519", &empty).await.unwrap();
    assert!(record.is_empty());
    assert_eq!(market.batch_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn explicit_dates_second_call_is_served_from_cache() {
    let market = MockMarket::new(BatchMode::Serve, SingleMode::Serve)
        .row("600519.SH", d(10, 1), 0.4)
        .row("600519.SH", d(10, 2), -0.9)
        .build();
    let p = pipeline(MockCalendar::empty(), market.clone(), &config());
    let dates = ["2025-10-01", "2025-10-02"];

    let first = p.get_instrument_performance("600519", &dates).await.unwrap();
    assert!(first.is_complete_real());
    assert_eq!(market.batch_calls(), 1);
    assert_eq!(p.cache_stats().performance.writes, 1);

    let second = p.get_instrument_performance("600519", &dates).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(market.batch_calls(), 1);
    assert_eq!(market.single_calls(), 0);
    let stats = p.cache_stats().performance;
    assert_eq!(stats.writes, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test(start_paused = true)]
async fn boards_do_not_share_cache_entries() {
    let market = full_week(MockMarket::new(BatchMode::Serve, SingleMode::Serve), "600519.SH").build();
    let p = pipeline(MockCalendar::empty(), market.clone(), &config());

    let sh = p.get_performance("600519.SH", "2025-10-10", 5).await.unwrap();
    assert!(sh.is_complete_real());
    let sz = p.get_performance("600519.SZ", "2025-10-10", 5).await.unwrap();
    assert_eq!(sz.real_count(), 0);
    assert_eq!(market.batch_calls(), 2);
    let requests = market.batch_requests.lock().unwrap().clone();
    assert_eq!(requests[1].ts_codes, vec!["600519.SZ".to_string()]);

    assert_eq!(p.invalidate_instrument("600519.SZ").unwrap(), 1);
    let again = p.get_performance("600519.SH", "2025-10-10", 5).await.unwrap();
    assert_eq!(again, sh);
    assert_eq!(market.batch_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn trading_day_membership() {
    let golden_week = (1..=8).map(|day| d(10, day)).collect();
    let market = MockMarket::new(BatchMode::Serve, SingleMode::Serve).build();
    let p = pipeline(MockCalendar::with_holidays(golden_week), market, &config());

    assert!(!p.is_trading_day("2025-10-06").await.unwrap());
    assert!(p.is_trading_day("2025-10-09").await.unwrap());
    assert!(matches!(
        p.is_trading_day("2025-13-01").await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn spring_festival_is_skipped_both_ways() {
    let ymd = |m, day| chrono::NaiveDate::from_ymd_opt(2024, m, day).unwrap();
    let closed = (9..=16).map(|day| ymd(2, day)).collect();
    let market = MockMarket::new(BatchMode::Serve, SingleMode::Serve).build();
    let p = pipeline(MockCalendar::with_holidays(closed), market, &config());

    let forward = p
        .resolve_trading_days("2024-02-08", 1, Direction::Forward)
        .await
        .unwrap();
    assert_eq!(forward, vec![ymd(2, 19)]);
    let backward = p
        .resolve_trading_days("2024-02-18", 1, Direction::Backward)
        .await
        .unwrap();
    assert_eq!(backward, vec![ymd(2, 8)]);
}

#[tokio::test(start_paused = true)]
async fn matrix_built_on_weekday_fallback_is_not_reused_after_recovery() {
    let golden_week = (1..=8).map(|day| d(10, day)).collect();
    let calendar = MockCalendar::with_holidays(golden_week);
    calendar.set_down(true);
    let market = MockMarket::new(BatchMode::Serve, SingleMode::Serve).build();
    let p = pipeline(calendar.clone(), market, &config());

    let during_outage = p
        .get_trend_matrix(&["600519"], "2025-09-30", 3)
        .await
        .unwrap();
    assert_eq!(during_outage.days, vec![d(10, 1), d(10, 2), d(10, 3)]);

    calendar.set_down(false);
    let recovered = p
        .get_trend_matrix(&["600519"], "2025-09-30", 3)
        .await
        .unwrap();
    let expected = vec![d(10, 9), d(10, 10), d(10, 13)];
    assert_eq!(recovered.days, expected);
    assert_eq!(recovered.rows["600519"].dates().collect::<Vec<_>>(), expected);

    let single = p.get_performance("600519", "2025-09-30", 3).await.unwrap();
    assert_eq!(single.dates().collect::<Vec<_>>(), expected);
    assert_eq!(p.cache_stats().aggregate.hits, 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_input_is_rejected() {
    let market = MockMarket::new(BatchMode::Serve, SingleMode::Serve).build();
    let p = pipeline(MockCalendar::empty(), market.clone(), &config());

    let cases = [
        p.get_performance("600519", "2025/10/10", 5).await,
        p.get_performance("60051", "2025-10-10", 5).await,
        p.get_performance("600519", "2025-10-10", 0).await,
        p.get_trailing_week("600519.XX", "2025-10-10").await,
    ];
    for result in cases {
        assert!(matches!(result, Err(Error::InvalidInput(_))), "{result:?}");
    }
    assert_eq!(market.batch_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn matrix_reuses_cached_records_and_is_cached_itself() {
    let market = full_week(
        full_week(MockMarket::new(BatchMode::Serve, SingleMode::Serve), "600519.SH"),
        "000001.SZ",
    )
    .build();
    let p = pipeline(MockCalendar::empty(), market.clone(), &config());

    p.get_performance("600519", "2025-10-10", 5).await.unwrap();
    let matrix = p
        .get_trend_matrix(&["000001", "600519"], "2025-10-10", 5)
        .await
        .unwrap();

    assert_eq!(matrix.days, week_after_oct_10());
    assert_eq!(matrix.rows.keys().collect::<Vec<_>>(), vec!["000001", "600519"]);
    assert!(matrix.rows.values().all(|r| r.is_complete_real()));
    let requests = market.batch_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].ts_codes, vec!["000001.SZ".to_string()]);

    let again = p
        .get_trend_matrix(&["000001", "600519"], "2025-10-10", 5)
        .await
        .unwrap();
    assert_eq!(again, matrix);
    assert_eq!(market.batch_calls(), 2);
    assert_eq!(p.cache_stats().aggregate.hits, 1);
}

#[tokio::test(start_paused = true)]
async fn invalidation_forces_a_refetch() {
    let market = full_week(MockMarket::new(BatchMode::Serve, SingleMode::Serve), "600519.SH").build();
    let p = pipeline(MockCalendar::empty(), market.clone(), &config());

    p.get_performance("600519", "2025-10-10", 5).await.unwrap();
    assert_eq!(p.invalidate_instrument("600519.SH").unwrap(), 1);
    p.get_performance("600519", "2025-10-10", 5).await.unwrap();
    assert_eq!(market.batch_calls(), 2);

    p.clear_caches();
    assert_eq!(p.cache_stats().performance.entries, 0);
    p.get_performance("600519", "2025-10-10", 5).await.unwrap();
    assert_eq!(market.batch_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn performance_cache_expires_after_ttl() {
    let cfg = config();
    let market = full_week(MockMarket::new(BatchMode::Serve, SingleMode::Serve), "600519.SH").build();
    let p = pipeline(MockCalendar::empty(), market.clone(), &cfg);

    p.get_performance("600519", "2025-10-10", 5).await.unwrap();
    tokio::time::advance(cfg.cache.performance_ttl()).await;
    assert_eq!(p.purge_expired(), 1);
    p.get_performance("600519", "2025-10-10", 5).await.unwrap();
    assert_eq!(market.batch_calls(), 2);
}
