use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use surface_bridge::module::{BackingKey, InMemoryModule};
use surface_bridge::{AlphaType, ColorType, ModuleContext, SurfaceError, SurfaceHandle};

fn module_with_canvases(canvases: &[(&str, u32, u32)]) -> (Arc<InMemoryModule>, ModuleContext) {
    let _ = env_logger::builder().is_test(true).try_init();

    let module = Arc::new(InMemoryModule::new());
    for (id, width, height) in canvases {
        module.register_canvas(id, *width, *height);
    }
    let ctx = ModuleContext::new(module.clone(), None);
    (module, ctx)
}

#[tokio::test]
async fn canvas_scenario_end_to_end() {
    let (module, ctx) = module_with_canvases(&[("c1", 100, 100)]);
    let mut surface = SurfaceHandle::from_canvas(&ctx, "c1").unwrap();

    assert_eq!(surface.width().await.unwrap(), 100);
    assert_eq!(surface.height().await.unwrap(), 100);

    let pixels = surface
        .read_pixels(ColorType::Rgba8888, AlphaType::Premultiplied)
        .await
        .unwrap()
        .expect("pixels");
    assert_eq!(pixels.len(), 40_000);

    let none = surface
        .read_pixels(ColorType::Unknown, AlphaType::Premultiplied)
        .await
        .unwrap();
    assert!(none.is_none());

    surface.release();
    assert!(matches!(surface.width().await, Err(SurfaceError::UseAfterFree { .. })));

    assert_eq!(module.live_scratch_regions(), 0);
    assert_eq!(module.invalid_frees(), 0);
    assert_eq!(module.released_surfaces(), 1);
}

#[tokio::test]
async fn painted_pixels_come_back_in_requested_layout() {
    let (module, ctx) = module_with_canvases(&[("c1", 2, 1)]);
    module.paint(&BackingKey::Canvas("c1".into()), 1, 0, [10, 20, 30, 255]);
    let surface = SurfaceHandle::from_canvas(&ctx, "c1").unwrap();

    let rgba = surface
        .read_pixels(ColorType::Rgba8888, AlphaType::Premultiplied)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rgba, vec![0, 0, 0, 0, 10, 20, 30, 255]);

    let bgra = surface
        .read_pixels(ColorType::Bgra8888, AlphaType::Premultiplied)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bgra, vec![0, 0, 0, 0, 30, 20, 10, 255]);

    let alpha = surface
        .read_pixels(ColorType::Alpha8, AlphaType::Premultiplied)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alpha, vec![0, 255]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rewind_pauses_every_handle_of_the_module() {
    let (_module, ctx) = module_with_canvases(&[("a", 10, 10), ("b", 20, 20)]);
    let a = Arc::new(SurfaceHandle::from_canvas(&ctx, "a").unwrap());
    let b = Arc::new(SurfaceHandle::from_canvas(&ctx, "b").unwrap());

    let rewind = ctx.begin_rewind();
    let resumed = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let surface = if i % 2 == 0 { a.clone() } else { b.clone() };
        let ctx = ctx.clone();
        let resumed = resumed.clone();
        tasks.push(tokio::spawn(async move {
            let width = surface.width().await.unwrap();
            resumed.fetch_add(1, Ordering::SeqCst);
            (width, ctx.barrier().generation())
        }));
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(resumed.load(Ordering::SeqCst), 0);

    rewind.finish();

    let results = join_all(tasks).await;
    for (i, res) in results.into_iter().enumerate() {
        let (width, generation) = res.unwrap();
        assert_eq!(width, if i % 2 == 0 { 10 } else { 20 });
        assert_eq!(generation, 1);
    }
    assert_eq!(resumed.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn contexts_of_different_modules_do_not_share_rewinds() {
    let (_m1, ctx1) = module_with_canvases(&[("c1", 5, 5)]);
    let (_m2, ctx2) = module_with_canvases(&[("c1", 7, 7)]);
    assert!(!ctx1.same_module(&ctx2));
    assert!(ctx1.same_module(&ctx1.clone()));

    let other = SurfaceHandle::from_canvas(&ctx2, "c1").unwrap();
    let _rewind = ctx1.begin_rewind();

    let width = tokio::time::timeout(Duration::from_secs(1), other.width())
        .await
        .expect("unrelated module must not be paused");
    assert_eq!(width.unwrap(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reads_on_different_handles_do_not_leak_scratch() {
    let canvases: Vec<(String, u32, u32)> = (0..6).map(|i| (format!("c{i}"), 8 + i, 4)).collect();
    let refs: Vec<(&str, u32, u32)> = canvases.iter().map(|(id, w, h)| (id.as_str(), *w, *h)).collect();
    let (module, ctx) = module_with_canvases(&refs);

    let mut tasks = Vec::new();
    for (id, width, height) in canvases {
        let ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            let mut surface = SurfaceHandle::from_canvas(&ctx, &id).unwrap();
            for _ in 0..10 {
                let pixels = surface
                    .read_pixels(ColorType::Rgba8888, AlphaType::Unpremultiplied)
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(pixels.len(), (width * height * 4) as usize);
            }
            surface.release();
        }));
    }

    for res in join_all(tasks).await {
        res.unwrap();
    }

    assert_eq!(module.total_allocations(), 60);
    assert_eq!(module.live_scratch_regions(), 0);
    assert_eq!(module.invalid_frees(), 0);
    assert_eq!(module.released_surfaces(), 6);
    assert_eq!(module.cached_bytes(), 0);
}
