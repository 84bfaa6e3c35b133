#![cfg(target_arch = "wasm32")]

use wasm_bindgen::prelude::*;

use crate::app::Session;
use crate::config::RuntimeConfig;
use crate::scene::Scene;

#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Browser entry point. The host page owns the render loop and calls
/// [`step`](WasmRuntime::step) once per animation frame.
#[wasm_bindgen]
pub struct WasmRuntime {
    session: Session,
}

#[wasm_bindgen]
impl WasmRuntime {
    /// `config_json` may be empty for defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<WasmRuntime, JsValue> {
        let config = if config_json.trim().is_empty() {
            RuntimeConfig::default()
        } else {
            RuntimeConfig::from_json(config_json).map_err(|err| js_error(format!("{err:#}")))?
        };
        Ok(Self {
            session: Session::new(config),
        })
    }

    /// Returns the number of nodes created.
    pub fn load_xml(&mut self, xml: &str) -> Result<u32, JsValue> {
        let scene = Scene::from_xml(xml).map_err(|err| js_error(format!("{err:#}")))?;
        self.load(&scene)
    }

    pub fn load_json(&mut self, json: &str) -> Result<u32, JsValue> {
        let scene = Scene::from_json(json).map_err(|err| js_error(format!("{err:#}")))?;
        self.load(&scene)
    }

    fn load(&mut self, scene: &Scene) -> Result<u32, JsValue> {
        let created = self
            .session
            .load_scene(scene)
            .map_err(|err| js_error(format!("{err:#}")))?;
        Ok(created.len() as u32)
    }

    /// Advances one frame; `delta` is in seconds, non-positive means the
    /// configured frame delta.
    pub fn step(&mut self, delta: f32) {
        if delta > 0.0 && delta.is_finite() {
            self.session.step_by(delta);
        } else {
            self.session.step();
        }
    }

    /// Forwards a DOM key event; returns `false` for unknown keys.
    pub fn set_key(&self, code: &str, down: bool) -> bool {
        self.session.input().set_key(code, down)
    }

    pub fn node_state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.session.manager().node_states()).map_err(js_error)
    }

    pub fn drain_events_json(&mut self) -> Result<String, JsValue> {
        serde_json::to_string(&self.session.drain_events()).map_err(js_error)
    }

    pub fn variables_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.session.manager().variables().snapshot()).map_err(js_error)
    }
}
