//! `window.ethereum` access through `js_sys::Reflect`.
//!
//! Every property read can throw (cross-origin frames, hostile getters), so
//! each one is surfaced as a [`HostAccessError`] instead of a panic.

use js_sys::{Array, Function, Promise, Reflect};
use serde_json::Value;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

use paydist::{Host, HostAccessError, HostProvider, RpcError, WalletProvider};

const INTERNAL_ERROR_CODE: i64 = -32603;

fn get(target: &JsValue, key: &str) -> Result<JsValue, HostAccessError> {
    Reflect::get(target, &JsValue::from_str(key))
        .map_err(|e| HostAccessError(format!("reading '{key}': {e:?}")))
}

fn is_absent(v: &JsValue) -> bool {
    v.is_undefined() || v.is_null()
}

/// The page's global object, or any object standing in for it.
pub struct BrowserHost {
    global: JsValue,
}

impl BrowserHost {
    /// The current `window`; `None` outside a browsing context.
    pub fn window() -> Option<Self> {
        web_sys::window().map(|w| Self { global: w.into() })
    }

    pub fn from_object(global: JsValue) -> Self {
        Self { global }
    }
}

impl Host for BrowserHost {
    type Provider = InjectedProvider;

    fn injected_provider(&self) -> Result<Option<InjectedProvider>, HostAccessError> {
        let ethereum = get(&self.global, "ethereum")?;
        Ok((!is_absent(&ethereum)).then_some(InjectedProvider(ethereum)))
    }

    fn has_global(&self, name: &str) -> Result<bool, HostAccessError> {
        get(&self.global, name).map(|v| !is_absent(&v))
    }
}

/// An EIP-1193 provider object injected by a wallet extension.
#[derive(Debug, Clone)]
pub struct InjectedProvider(pub JsValue);

impl HostProvider for InjectedProvider {
    fn flag(&self, name: &str) -> Result<bool, HostAccessError> {
        Ok(get(&self.0, name)?.as_bool().unwrap_or(false))
    }

    fn sub_providers(&self) -> Result<Vec<Self>, HostAccessError> {
        let providers = get(&self.0, "providers")?;
        if !Array::is_array(&providers) {
            return Ok(Vec::new());
        }
        Ok(Array::from(&providers)
            .iter()
            .filter(|p| !is_absent(p))
            .map(InjectedProvider)
            .collect())
    }

    fn selected_provider(&self) -> Result<Option<Self>, HostAccessError> {
        let selected = get(&self.0, "selectedProvider")?;
        Ok((!is_absent(&selected)).then_some(InjectedProvider(selected)))
    }
}

fn to_js(value: &Value) -> Result<JsValue, RpcError> {
    js_sys::JSON::parse(&value.to_string())
        .map_err(|e| RpcError::new(INTERNAL_ERROR_CODE, format!("params not encodable: {e:?}")))
}

fn from_js(value: &JsValue) -> Result<Value, RpcError> {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    let text = js_sys::JSON::stringify(value)
        .map_err(|e| RpcError::new(INTERNAL_ERROR_CODE, format!("result not serializable: {e:?}")))?;
    match text.as_string() {
        Some(s) => serde_json::from_str(&s)
            .map_err(|e| RpcError::new(INTERNAL_ERROR_CODE, format!("result not JSON: {e}"))),
        None => Ok(Value::Null),
    }
}

/// Wallet errors are objects with `code` and `message`; anything else
/// becomes an internal error carrying its debug text.
fn rpc_error(err: JsValue) -> RpcError {
    let code = Reflect::get(&err, &JsValue::from_str("code"))
        .ok()
        .and_then(|c| c.as_f64())
        .map(|c| c as i64)
        .unwrap_or(INTERNAL_ERROR_CODE);
    let message = Reflect::get(&err, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{err:?}"));
    RpcError::new(code, message)
}

impl WalletProvider for InjectedProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let args = js_sys::Object::new();
        Reflect::set(&args, &"method".into(), &JsValue::from_str(method)).map_err(rpc_error)?;
        Reflect::set(&args, &"params".into(), &to_js(&params)?).map_err(rpc_error)?;

        let request: Function = get(&self.0, "request")
            .map_err(|e| RpcError::new(INTERNAL_ERROR_CODE, e.to_string()))?
            .dyn_into()
            .map_err(|_| RpcError::new(INTERNAL_ERROR_CODE, "provider has no request()"))?;

        tracing::debug!(method, "wallet request");
        let returned = request.call1(&self.0, &args).map_err(rpc_error)?;
        let result = match returned.dyn_into::<Promise>() {
            Ok(promise) => JsFuture::from(promise).await.map_err(rpc_error)?,
            Err(value) => value,
        };
        from_js(&result)
    }
}
