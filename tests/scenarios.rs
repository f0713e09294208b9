use std::f64::consts::TAU;
use std::rc::Rc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use sonogram_grid::canvas::geometry::{View, ZoomLevel};
use sonogram_grid::canvas::image::{Rect, Rgba, RgbaImage};
use sonogram_grid::canvas::renderer::{CacheState, GridRenderer, RenderSources, RenderType};
use sonogram_grid::config::{BinDisplay, BinScale, RenderParams, SpectralConfig};
use sonogram_grid::dsp::column_ops::{distribute, normalize, ColumnNormalization};
use sonogram_grid::dsp::peak_cache::PeakPoolingCache;
use sonogram_grid::dsp::percentile::PercentileFilter;
use sonogram_grid::dsp::spectral_source::SpectralColumnSource;
use sonogram_grid::dsp::window::WindowKind;
use sonogram_grid::types::{AudioData, Column, DenseGrid, GridData, SampleProvider};

fn approx(a: &[f32], b: &[f32], eps: f32) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < eps)
}

fn random_columns(rng: &mut SmallRng, width: usize, height: usize) -> Vec<Column> {
    (0..width)
        .map(|_| (0..height).map(|_| rng.random::<f32>()).collect())
        .collect()
}

fn full(view: &View) -> Rect {
    Rect::new(0, 0, view.width, view.height)
}

fn paint(r: &mut GridRenderer, view: &View) -> RgbaImage {
    let mut surface = RgbaImage::new(view.width as usize, view.height as usize);
    r.render(view, &mut surface, full(view));
    surface
}

#[test]
fn dc_signal_column_shows_hann_halving() {
    let audio: Rc<dyn SampleProvider> = Rc::new(AudioData::mono(vec![1.0; 16], 8000));
    let config = SpectralConfig {
        window: WindowKind::Hann,
        window_size: 8,
        hop: 8,
        fft_size: 8,
        ..SpectralConfig::default()
    };
    let source = SpectralColumnSource::new(audio, config).unwrap();
    let (re, im) = source.values_at(1, 0, source.height());
    assert!((re[0] - 4.0).abs() < 1e-4, "{re:?}");
    assert!((re[1] - 2.0).abs() < 1e-4, "{re:?}");
    assert!(re[2..].iter().all(|v| v.abs() < 1e-4), "{re:?}");
    assert!(im.iter().all(|v| v.abs() < 1e-4), "{im:?}");
}

#[test]
fn distribute_upsamples_by_repeat_or_interpolation() {
    let rows = [0.0, 0.5, 1.0, 1.5, 2.0, 2.5];
    assert_eq!(
        distribute(&[1.0, 2.0, 3.0], 6, &rows, 0, false),
        vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]
    );
    assert!(approx(
        &distribute(&[1.0, 2.0, 3.0], 6, &rows, 0, true),
        &[1.0, 1.0, 1.5, 2.0, 2.5, 3.0],
        1e-6
    ));

    let column = [0.3, 0.9, 0.1, 0.4];
    let identity = [0.0, 1.0, 2.0, 3.0];
    assert_eq!(distribute(&column, 4, &identity, 0, false), column.to_vec());
}

#[test]
fn hybrid_normalization_scales_by_log_peak() {
    let out = normalize(&[22.0, 44.0, 99.0, 66.0], ColumnNormalization::Hybrid);
    let expected = [44.0 / 99.0, 88.0 / 99.0, 2.0, 132.0 / 99.0];
    assert!(approx(&out, &expected, 1e-5), "{out:?}");

    let once = normalize(&[3.0, -6.0, 1.5], ColumnNormalization::Max1);
    assert_eq!(normalize(&once, ColumnNormalization::Max1), once);
}

#[test]
fn percentile_filter_stays_consistent_under_random_use() {
    let mut rng = SmallRng::seed_from_u64(7);
    let mut filter = PercentileFilter::<f32>::with_percentile(9, 80.0);
    for step in 0..2000 {
        match rng.random_range(0..20) {
            0 => filter.resize(rng.random_range(1..30)),
            1 => filter.set_percentile(rng.random_range(0.0..100.0)),
            2 => filter.push(f32::NAN),
            _ => filter.push(rng.random_range(-5.0..5.0)),
        }
        assert!(filter.check_integrity(), "step {step}");
    }
}

#[test]
fn pooled_columns_are_bin_wise_maxima() {
    let mut rng = SmallRng::seed_from_u64(11);
    let columns = random_columns(&mut rng, 10, 6);
    let grid = Rc::new(GridData::from_columns(columns.clone(), 1, 1000));
    let pooled = PeakPoolingCache::new(grid, 3).unwrap();
    assert_eq!(pooled.width(), 4);
    assert_eq!(pooled.resolution(), 3);
    for i in 0..3 {
        let got = pooled.column(i);
        for b in 0..6 {
            let expected = (0..3).map(|j| columns[i * 3 + j][b]).fold(f32::MIN, f32::max);
            assert_eq!(got[b], expected, "column {i} bin {b}");
        }
    }
}

#[test]
fn growing_grid_refreshes_the_incomplete_pooled_column() {
    let grid = Rc::new(GridData::from_columns(vec![vec![0.1, 0.1]; 5], 1, 1000));
    let pooled = PeakPoolingCache::new(grid.clone(), 2).unwrap();
    assert_eq!(pooled.column(0), vec![0.1, 0.1]);
    assert_eq!(pooled.column(2), vec![0.1, 0.1]);
    assert!(pooled.is_populated(2));

    grid.push_column(vec![0.2, 0.9]);
    assert!(!pooled.is_populated(2));
    assert_eq!(pooled.column(2), vec![0.2, 0.9]);
    assert!(pooled.is_populated(0));
}

#[test]
fn scrolling_reproduces_a_fresh_render_in_every_mode() {
    let mut rng = SmallRng::seed_from_u64(3);
    let grid = Rc::new(GridData::from_columns(random_columns(&mut rng, 200, 32), 4, 1000));
    let modes = [
        RenderParams::default(),
        RenderParams {
            bin_scale: BinScale::Log,
            interpolate: true,
            ..RenderParams::default()
        },
        RenderParams {
            bin_display: BinDisplay::PeakBins,
            invert_vertical: true,
            normalization: ColumnNormalization::Max1,
            ..RenderParams::default()
        },
    ];
    for params in modes {
        let view = View::new(80, ZoomLevel::FramesPerPixel(4), 48, 24);
        for shift in [4i64, 36, -20, 400] {
            let moved = view.scrolled_to(80 + shift);
            let mut scrolled = GridRenderer::new(RenderSources::new(grid.clone()), params.clone());
            paint(&mut scrolled, &view);
            let after_scroll = paint(&mut scrolled, &moved);

            let mut fresh = GridRenderer::new(RenderSources::new(grid.clone()), params.clone());
            assert!(after_scroll == paint(&mut fresh, &moved), "{params:?} shift {shift}");
        }
    }
}

#[test]
fn bin_resolution_scrolling_at_uneven_zoom_matches_a_fresh_render() {
    let mut rng = SmallRng::seed_from_u64(9);
    let grid = Rc::new(GridData::from_columns(random_columns(&mut rng, 200, 32), 4, 1000));
    for interpolate in [false, true] {
        let params = RenderParams {
            always_opaque: true,
            interpolate,
            ..RenderParams::default()
        };
        // three frames per pixel never divides the four-frame columns evenly
        let view = View::new(90, ZoomLevel::FramesPerPixel(3), 48, 24);
        for shift in [3i64, 12, 24, -9, 7, 600] {
            let moved = view.scrolled_to(90 + shift);
            let mut scrolled = GridRenderer::new(RenderSources::new(grid.clone()), params.clone());
            assert_eq!(scrolled.render_type(&view), RenderType::DrawBufferBinResolution);
            paint(&mut scrolled, &view);
            let after_scroll = paint(&mut scrolled, &moved);

            let mut fresh = GridRenderer::new(RenderSources::new(grid.clone()), params.clone());
            assert!(
                after_scroll == paint(&mut fresh, &moved),
                "interpolate {interpolate} shift {shift}"
            );
        }
    }
}

#[test]
fn time_constrained_rendering_converges() {
    let mut rng = SmallRng::seed_from_u64(5);
    let grid = Rc::new(GridData::from_columns(random_columns(&mut rng, 100, 16), 2, 1000));
    let view = View::new(0, ZoomLevel::FramesPerPixel(4), 40, 16);

    let mut r = GridRenderer::new(RenderSources::new(grid.clone()), RenderParams::default());
    let mut surface = RgbaImage::new(40, 16);
    let mut calls = 0;
    loop {
        r.render_time_constrained(&view, &mut surface, full(&view));
        calls += 1;
        if r.largest_uncached_rect(&view).is_empty() || calls > 100 {
            break;
        }
    }
    assert_eq!(r.cache_state(&view), CacheState::WarmCache);
    r.render_time_constrained(&view, &mut surface, full(&view));

    let mut fresh = GridRenderer::new(RenderSources::new(grid), RenderParams::default());
    assert!(surface == paint(&mut fresh, &view));
}

#[test]
fn peak_frequency_display_places_a_partial_on_its_row() {
    let rate = 8000;
    // exactly bin 16 of a 256-point FFT
    let samples: Vec<f32> = (0..4096)
        .map(|i| (TAU * 500.0 * i as f64 / rate as f64).sin() as f32)
        .collect();
    let audio: Rc<dyn SampleProvider> = Rc::new(AudioData::mono(samples, rate));
    let config = SpectralConfig {
        window_size: 256,
        hop: 64,
        fft_size: 256,
        ..SpectralConfig::default()
    };
    let source = SpectralColumnSource::new(audio, config).unwrap();
    assert_eq!(source.height(), 129);

    let params = RenderParams {
        bin_display: BinDisplay::PeakFrequencies,
        ..RenderParams::default()
    };
    let view = View::new(0, ZoomLevel::FramesPerPixel(64), 20, 129);
    let mut r = GridRenderer::new(RenderSources::from_spectral(source), params);
    assert_eq!(r.render_type(&view), RenderType::DrawBufferPixelResolution);

    let mut surface = RgbaImage::new(20, 129);
    let result = r.render(&view, &mut surface, full(&view));
    assert_eq!(result.rendered, full(&view));
    for x in [4, 10, 15] {
        assert_ne!(surface.pixel(x, 112), Rgba::new(0, 0, 0, 255), "x {x}");
    }
}

#[test]
fn live_audio_append_extends_the_source() {
    let audio = Rc::new(AudioData::mono(vec![0.25; 1024], 8000));
    let provider: Rc<dyn SampleProvider> = audio.clone();
    let source = SpectralColumnSource::new(provider, SpectralConfig::with_size(256)).unwrap();
    let before = source.width();
    audio.append(&vec![0.25; 1024]);
    assert!(source.width() > before);
    assert_eq!(source.completion(), 100);
}

#[test]
fn params_from_json_drive_the_renderer() {
    let params = RenderParams::from_json(
        r#"{"color_map":"Sunset","bin_scale":"Log","always_opaque":true,"color_rotation":30}"#,
    )
    .unwrap();
    assert_eq!(params.gain, 1.0);
    let grid = Rc::new(GridData::from_columns(vec![vec![0.0, 0.5, 1.0]; 8], 8, 1000));
    let view = View::new(0, ZoomLevel::PixelsPerFrame(2), 64, 60);
    let mut r = GridRenderer::new(RenderSources::new(grid), params);
    // opaque forces the cached path even for large cells
    assert_eq!(r.render_type(&view), RenderType::DrawBufferBinResolution);
    let mut surface = RgbaImage::new(64, 60);
    assert_eq!(r.render(&view, &mut surface, full(&view)).rendered, full(&view));
    assert_eq!(surface.pixel(10, 59).a, 255);
}
