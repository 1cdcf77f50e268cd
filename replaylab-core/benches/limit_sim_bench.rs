//! Criterion benchmarks for ReplayLab hot paths.
//!
//! Benchmarks:
//! 1. Vectorized limit simulation over growing series
//! 2. Bar-replay driver with a steady stream of limit round trips

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use chrono::{Duration, TimeZone, Utc};
use replaylab_core::vectorized::{LimitSimulation, PriceSource, Timeout};
use replaylab_core::{
    BackTester, Bar, BarSeries, EngineConfig, EntryRequest, ExitRequest, PositionQuery, Side,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<Bar> {
    let t0 = Utc.with_ymd_and_hms(2021, 4, 16, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            let open = close - 0.3;
            Bar::new(
                t0 + Duration::minutes(i as i64),
                open,
                close + 1.5,
                close - 1.5,
                close,
            )
        })
        .collect()
}

// ── 1. Vectorized Limit Simulation ───────────────────────────────────

fn bench_limit_sim(c: &mut Criterion) {
    let mut group = c.benchmark_group("limit_sim");

    for &n in &[1_000usize, 10_000] {
        let series = BarSeries::new(make_bars(n));
        let entry: Vec<f64> = series.iter().map(|b| b.close - 1.0).collect();
        let exit: Vec<f64> = series.iter().map(|b| b.close + 1.0).collect();
        let cut: Vec<f64> = series.iter().map(|b| b.close - 4.0).collect();
        let sim = LimitSimulation::new(Side::Buy)
            .with_entry_prices(PriceSource::Values(entry))
            .with_exit_prices(PriceSource::Values(exit))
            .with_loss_cut_prices(PriceSource::Values(cut))
            .with_timeout(Timeout::bars(30, 120));

        group.bench_with_input(BenchmarkId::new("buy_with_loss_cut", n), &n, |b, _| {
            b.iter(|| black_box(sim.run(black_box(&series)).unwrap()))
        });
    }

    group.finish();
}

// ── 2. Bar-Replay Driver ─────────────────────────────────────────────

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");
    let bars = make_bars(5_000);

    group.bench_function("limit_round_trips_5000_bars", |b| {
        b.iter(|| {
            let mut bt = BackTester::new(bars.clone(), EngineConfig::default());
            bt.run(|bt, _| {
                let close = bt.current_bar().map_or(100.0, |b| b.close);
                if bt.book().order_count() == 0 && bt.book().position_count() == 0 {
                    bt.entry(EntryRequest::limit(Side::Buy, close - 0.5).with_expire_seconds(600))?;
                }
                let free: Vec<_> = bt
                    .positions(&PositionQuery::default().non_closing())
                    .iter()
                    .map(|p| (p.id(), p.open_price()))
                    .collect();
                for (pid, open) in free {
                    bt.exit(pid, ExitRequest::limit(open + 1.0).with_loss_cut(open - 3.0))?;
                }
                Ok(())
            })
            .unwrap();
            black_box(bt.cum_gain())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_limit_sim, bench_replay);
criterion_main!(benches);
