//! Browser implementations of the tracker capabilities
//!
//! Each capability maps to one browser primitive: a `<script async>` element
//! for loading, `setTimeout` for the deadline, `window.dataLayer` and
//! `window.gtag` for the primary tag, `navigator.sendBeacon` / `fetch` for the
//! fallback channel and `localStorage` for the client id.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use js_sys::{Array, Date, Function, Object, Reflect};
use tagrelay_core::{
    BeaconOutcome, EventParams, Environment, FallbackNetwork, KeyValueStore, LoadSignal,
    LoadTimer, ParamValue, PrimaryTransport, Result as TagRelayResult, SystemTimeSource,
    TagCommand, TagLoader, TagRelayError,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{HtmlScriptElement, RequestInit, RequestMode, Window};

use crate::utils::describe_js;

/// Environment backed by the current browser window
pub fn browser_environment() -> Environment {
    Environment {
        loader: Rc::new(ScriptTagLoader),
        timer: Rc::new(WindowTimer::default()),
        primary: Rc::new(GtagBridge),
        network: Rc::new(BrowserNetwork),
        storage: Rc::new(LocalStorageStore),
        clock: Rc::new(SystemTimeSource::new()),
    }
}

fn window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("no global window"))
}

// ----------------------------------------------------------------------------
// Script Loader
// ----------------------------------------------------------------------------

/// Appends an async `<script>` to `<head>` and reports onload / onerror
pub struct ScriptTagLoader;

impl TagLoader for ScriptTagLoader {
    fn load(&self, script_url: &str, signal: LoadSignal) {
        if let Err(e) = append_script(script_url, signal.clone()) {
            signal.failed(format!("could not insert script: {}", describe_js(&e)));
        }
    }
}

fn append_script(script_url: &str, signal: LoadSignal) -> Result<(), JsValue> {
    let document = window()?
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let script = document
        .create_element("script")?
        .dyn_into::<HtmlScriptElement>()
        .map_err(JsValue::from)?;
    script.set_async(true);
    script.set_src(script_url);

    let on_load = signal.clone();
    let onload = Closure::once_into_js(move || on_load.loaded());
    script.set_onload(Some(onload.unchecked_ref()));

    let onerror = Closure::once_into_js(move |_event: web_sys::Event| {
        signal.failed("script error event");
    });
    script.set_onerror(Some(onerror.unchecked_ref()));

    let head = document
        .head()
        .ok_or_else(|| JsValue::from_str("no document head"))?;
    head.append_child(&script)?;
    Ok(())
}

// ----------------------------------------------------------------------------
// Load Timer
// ----------------------------------------------------------------------------

/// `setTimeout` deadline; keeps the handle for `clearTimeout`
#[derive(Debug, Default)]
pub struct WindowTimer {
    handle: Cell<Option<i32>>,
}

impl LoadTimer for WindowTimer {
    fn arm(&self, after: Duration, signal: LoadSignal) {
        let callback = Closure::once_into_js(move || signal.timed_out());
        let millis = after.as_millis().min(i32::MAX as u128) as i32;
        let armed = window().and_then(|window| {
            window.set_timeout_with_callback_and_timeout_and_arguments_0(
                callback.unchecked_ref(),
                millis,
            )
        });
        match armed {
            Ok(handle) => self.handle.set(Some(handle)),
            Err(e) => tracing::warn!("Could not arm load timer: {}", describe_js(&e)),
        }
    }

    fn cancel(&self) {
        if let Some(handle) = self.handle.take() {
            if let Ok(window) = window() {
                window.clear_timeout_with_handle(handle);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Primary Transport
// ----------------------------------------------------------------------------

const GTAG_STUB_BODY: &str =
    "window.dataLayer = window.dataLayer || []; window.dataLayer.push(arguments);";

/// Bridge to `window.gtag`, installing the queueing stub when absent
pub struct GtagBridge;

impl PrimaryTransport for GtagBridge {
    fn install_stub(&self) {
        if let Err(e) = install_gtag_stub() {
            tracing::warn!("Could not install gtag stub: {}", describe_js(&e));
        }
    }

    fn command(&self, command: TagCommand) {
        if let Err(e) = call_gtag(&command) {
            tracing::warn!(
                "gtag '{}' command failed: {}",
                command.command_name(),
                describe_js(&e)
            );
        }
    }
}

fn install_gtag_stub() -> Result<(), JsValue> {
    let window = window()?;
    let data_layer = Reflect::get(&window, &JsValue::from_str("dataLayer"))?;
    if !data_layer.is_instance_of::<Array>() {
        Reflect::set(&window, &JsValue::from_str("dataLayer"), &Array::new())?;
    }

    let gtag = Reflect::get(&window, &JsValue::from_str("gtag"))?;
    if !gtag.is_function() {
        // gtag.js expects the `arguments` object itself, not an array copy
        let stub = Function::new_no_args(GTAG_STUB_BODY);
        Reflect::set(&window, &JsValue::from_str("gtag"), &stub)?;
    }
    Ok(())
}

fn call_gtag(command: &TagCommand) -> Result<(), JsValue> {
    let window = window()?;
    let gtag = Reflect::get(&window, &JsValue::from_str("gtag"))?.dyn_into::<Function>()?;

    let args = Array::new();
    args.push(&JsValue::from_str(command.command_name()));
    match command {
        TagCommand::Js { timestamp } => {
            args.push(&Date::new(&JsValue::from_f64(timestamp.as_millis() as f64)));
        }
        TagCommand::Config { measurement_id } => {
            args.push(&JsValue::from_str(measurement_id.as_str()));
        }
        TagCommand::Event(event) => {
            args.push(&JsValue::from_str(event.name.as_str()));
            args.push(&params_to_js(&event.params)?.into());
        }
    }
    gtag.apply(&JsValue::NULL, &args)?;
    Ok(())
}

/// Plain object of the present parameters
pub fn params_to_js(params: &EventParams) -> Result<Object, JsValue> {
    let object = Object::new();
    for (key, value) in params.present() {
        let js_value = match value {
            ParamValue::Text(text) => JsValue::from_str(text),
            ParamValue::Number(number) => JsValue::from_f64(*number),
            ParamValue::Bool(flag) => JsValue::from_bool(*flag),
            ParamValue::Absent => continue,
        };
        Reflect::set(&object, &JsValue::from_str(key), &js_value)?;
    }
    Ok(object)
}

/// Read a caller-supplied params object; non-scalar values are skipped
pub fn params_from_js(value: &JsValue) -> EventParams {
    let mut params = EventParams::new();
    if value.is_undefined() || value.is_null() {
        return params;
    }
    if !value.is_object() {
        tracing::warn!("Ignoring non-object event params: {}", describe_js(value));
        return params;
    }

    for entry in Object::entries(value.unchecked_ref::<Object>()).iter() {
        let pair: Array = entry.unchecked_into();
        let Some(key) = pair.get(0).as_string() else {
            continue;
        };
        let raw = pair.get(1);
        let param = if let Some(text) = raw.as_string() {
            ParamValue::Text(text)
        } else if let Some(number) = raw.as_f64() {
            ParamValue::Number(number)
        } else if let Some(flag) = raw.as_bool() {
            ParamValue::Bool(flag)
        } else if raw.is_null() || raw.is_undefined() {
            ParamValue::Absent
        } else {
            tracing::debug!("Skipping non-scalar event param {}", key);
            continue;
        };
        params.insert(key, param);
    }
    params
}

// ----------------------------------------------------------------------------
// Fallback Network
// ----------------------------------------------------------------------------

/// `navigator.sendBeacon` first, `fetch` in `no-cors` mode otherwise
pub struct BrowserNetwork;

impl FallbackNetwork for BrowserNetwork {
    fn send_beacon(&self, url: &str) -> BeaconOutcome {
        let Ok(window) = window() else {
            return BeaconOutcome::Unsupported;
        };
        let navigator = window.navigator();
        if !Reflect::has(&navigator, &JsValue::from_str("sendBeacon")).unwrap_or(false) {
            return BeaconOutcome::Unsupported;
        }
        match navigator.send_beacon(url) {
            Ok(true) => BeaconOutcome::Queued,
            Ok(false) => BeaconOutcome::Rejected,
            Err(e) => {
                tracing::debug!("sendBeacon threw: {}", describe_js(&e));
                BeaconOutcome::Rejected
            }
        }
    }

    fn send_request(&self, url: &str) -> TagRelayResult<()> {
        let window = window().map_err(|e| TagRelayError::send_failed(describe_js(&e)))?;

        let init = RequestInit::new();
        init.set_method("GET");
        init.set_mode(RequestMode::NoCors);
        // web-sys has no binding for `keepalive`; set the dictionary member directly
        let _ = Reflect::set(&init, &JsValue::from_str("keepalive"), &JsValue::TRUE);
        let promise = window.fetch_with_str_and_init(url, &init);

        // The response is opaque in no-cors mode; only rejection is observable
        spawn_local(async move {
            if let Err(e) = JsFuture::from(promise).await {
                tracing::warn!(
                    "{}",
                    TagRelayError::send_failed(describe_js(&e))
                );
            }
        });
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Local Storage
// ----------------------------------------------------------------------------

/// `window.localStorage`; every failure maps to `StorageUnavailable`
pub struct LocalStorageStore;

fn local_storage() -> TagRelayResult<web_sys::Storage> {
    let window = window().map_err(|e| TagRelayError::storage_error(describe_js(&e)))?;
    window
        .local_storage()
        .map_err(|e| TagRelayError::storage_error(describe_js(&e)))?
        .ok_or_else(|| TagRelayError::storage_error("localStorage is disabled"))
}

impl KeyValueStore for LocalStorageStore {
    fn get(&self, key: &str) -> TagRelayResult<Option<String>> {
        local_storage()?
            .get_item(key)
            .map_err(|e| TagRelayError::storage_error(describe_js(&e)))
    }

    fn set(&self, key: &str, value: &str) -> TagRelayResult<()> {
        local_storage()?
            .set_item(key, value)
            .map_err(|e| TagRelayError::storage_error(describe_js(&e)))
    }
}
