//! Raster backends: turn a module element into per-frame images.

use std::collections::HashMap;
use std::sync::Arc;

use image::RgbaImage;
use scenestitch_common::{StitchError, StitchResult};
use scenestitch_timeline_model::TimelineElement;

/// Renders frames of one scene module's own content.
pub trait ModuleRenderer: Send + Sync {
    /// Render content frame `frame` at `width × height`.
    fn render_frame(&self, frame: u64, width: u32, height: u32) -> StitchResult<RgbaImage>;

    /// Length of the module's content in frames. 0 when unknown.
    fn total_frames(&self) -> u64;
}

/// Strategy for rasterizing module elements, chosen once per pre-renderer.
pub trait RasterBackend: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Check if this backend can render on the current host.
    fn is_available(&self) -> bool;

    /// Renderer for `element`, or `None` if this backend cannot render it.
    fn renderer_for(&self, element: &TimelineElement) -> Option<Arc<dyn ModuleRenderer>>;
}

/// Renderers registered by module id.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    renderers: HashMap<String, Arc<dyn ModuleRenderer>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module_id: impl Into<String>, renderer: Arc<dyn ModuleRenderer>) {
        let module_id = module_id.into();
        tracing::debug!(module = %module_id, "Registered module renderer");
        self.renderers.insert(module_id, renderer);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, module_id: impl Into<String>, renderer: Arc<dyn ModuleRenderer>) -> Self {
        self.register(module_id, renderer);
        self
    }

    pub fn len(&self) -> usize {
        self.renderers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renderers.is_empty()
    }
}

impl RasterBackend for ModuleRegistry {
    fn name(&self) -> &str {
        "module-registry"
    }

    fn is_available(&self) -> bool {
        !self.renderers.is_empty()
    }

    fn renderer_for(&self, element: &TimelineElement) -> Option<Arc<dyn ModuleRenderer>> {
        let module_id = element.module_id.as_deref()?;
        self.renderers.get(module_id).cloned()
    }
}

/// Pick the first available backend from `candidates`.
pub fn select_backend(candidates: Vec<Arc<dyn RasterBackend>>) -> StitchResult<Arc<dyn RasterBackend>> {
    for backend in candidates {
        if backend.is_available() {
            tracing::info!(backend = backend.name(), "Using raster backend");
            return Ok(backend);
        }
        tracing::debug!(backend = backend.name(), "Raster backend unavailable");
    }
    Err(StitchError::unsupported("No available raster backend"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    struct Flat;

    impl ModuleRenderer for Flat {
        fn render_frame(&self, _frame: u64, width: u32, height: u32) -> StitchResult<RgbaImage> {
            Ok(RgbaImage::from_pixel(width, height, Rgba([9, 9, 9, 255])))
        }

        fn total_frames(&self) -> u64 {
            10
        }
    }

    #[test]
    fn test_registry_resolves_by_module_id() {
        let registry = ModuleRegistry::new().with("intro", Arc::new(Flat));
        let element = TimelineElement::module("el", "intro", 0.0, 1.0);
        let renderer = registry.renderer_for(&element).unwrap();
        assert_eq!(renderer.total_frames(), 10);

        let other = TimelineElement::module("el", "outro", 0.0, 1.0);
        assert!(registry.renderer_for(&other).is_none());
    }

    #[test]
    fn test_select_backend_skips_unavailable() {
        let empty: Arc<dyn RasterBackend> = Arc::new(ModuleRegistry::new());
        let full: Arc<dyn RasterBackend> = Arc::new(ModuleRegistry::new().with("intro", Arc::new(Flat)));
        assert!(select_backend(vec![Arc::clone(&empty)]).is_err());
        let chosen = select_backend(vec![empty, full]).unwrap();
        assert!(chosen.is_available());
    }
}
