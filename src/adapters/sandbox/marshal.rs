//! Value conversion across the sandbox boundary.

use boa_engine::{Context, JsError, JsNativeError, JsObject, JsResult, JsString, JsValue};

use crate::domain::{HostError, HostValue, ScriptError};

pub(crate) fn to_js(value: &HostValue, context: &mut Context) -> JsResult<JsValue> {
    Ok(match value {
        HostValue::Undefined => JsValue::undefined(),
        HostValue::Null => JsValue::null(),
        HostValue::Bool(b) => JsValue::from(*b),
        HostValue::Number(n) => JsValue::from(*n),
        HostValue::String(s) => JsValue::from(JsString::from(s.as_str())),
        HostValue::Json(json) => JsValue::from_json(json, context)?,
    })
}

pub(crate) fn to_host(value: &JsValue, context: &mut Context) -> JsResult<HostValue> {
    if value.is_undefined() {
        return Ok(HostValue::Undefined);
    }
    if value.is_null() {
        return Ok(HostValue::Null);
    }
    if let Some(b) = value.as_boolean() {
        return Ok(HostValue::Bool(b));
    }
    if let Some(n) = value.as_number() {
        return Ok(HostValue::Number(n));
    }
    if let Some(s) = value.as_string() {
        return Ok(HostValue::String(s.to_std_string_escaped()));
    }
    // Functions do not survive serialization, same as JSON.stringify.
    if value.is_callable() {
        return Ok(HostValue::Undefined);
    }
    if value.is_object() {
        return Ok(HostValue::Json(value.to_json(context)?));
    }

    let text = value.to_string(context)?;
    Ok(HostValue::String(text.to_std_string_escaped()))
}

pub(crate) fn to_host_args(args: &[JsValue], context: &mut Context) -> JsResult<Vec<HostValue>> {
    args.iter().map(|arg| to_host(arg, context)).collect()
}

/// `typeof value`, used in entry lookup errors.
pub(crate) fn type_name(value: &JsValue) -> &'static str {
    if value.is_undefined() {
        "undefined"
    } else if value.is_boolean() {
        "boolean"
    } else if value.is_number() {
        "number"
    } else if value.is_string() {
        "string"
    } else if value.is_symbol() {
        "symbol"
    } else if value.is_bigint() {
        "bigint"
    } else if value.is_callable() {
        "function"
    } else {
        "object"
    }
}

pub(crate) fn host_error(err: &HostError) -> JsError {
    let native = match err.name.as_str() {
        "TypeError" => JsNativeError::typ(),
        "RangeError" => JsNativeError::range(),
        "ReferenceError" => JsNativeError::reference(),
        "SyntaxError" => JsNativeError::syntax(),
        _ => JsNativeError::error(),
    };
    native.with_message(err.message.clone()).into()
}

/// Reads `name`, `message` and `stack` off a thrown value.
pub(crate) fn script_error(thrown: &JsValue, context: &mut Context) -> ScriptError {
    let Some(object) = thrown.as_object() else {
        let message = thrown
            .to_string(context)
            .map(|s| s.to_std_string_escaped())
            .unwrap_or_else(|_| "uncaught exception".to_string());
        return ScriptError::new("Error", message, None);
    };
    let object = object.clone();

    let name = read_string(&object, "name", context).unwrap_or_else(|| "Error".to_string());
    let message = read_string(&object, "message", context).unwrap_or_default();
    let stack = read_string(&object, "stack", context);
    ScriptError::new(name, message, stack)
}

pub(crate) fn from_js_error(err: JsError, context: &mut Context) -> ScriptError {
    // Native errors are read directly; runtime limit errors have no script object.
    if let Some(native) = err.as_native() {
        let text = native.to_string();
        let name = text.split(": ").next().unwrap_or("Error").to_string();
        return ScriptError::new(name, native.message(), None);
    }
    match err.as_opaque() {
        Some(thrown) => {
            let thrown = thrown.clone();
            script_error(&thrown, context)
        }
        None => ScriptError::new("Error", err.to_string(), None),
    }
}

fn read_string(object: &JsObject, key: &str, context: &mut Context) -> Option<String> {
    let value = object.get(JsString::from(key), context).ok()?;
    if value.is_undefined() {
        return None;
    }
    value.to_string(context).ok().map(|s| s.to_std_string_escaped())
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::Source;

    #[test]
    fn test_primitives_cross_unchanged() {
        let mut context = Context::default();
        for value in [
            HostValue::Undefined,
            HostValue::Null,
            HostValue::Bool(true),
            HostValue::Number(42.5),
            HostValue::from("PROXY a:80"),
        ] {
            let js = to_js(&value, &mut context).unwrap();
            assert_eq!(to_host(&js, &mut context).unwrap(), value);
        }
    }

    #[test]
    fn test_objects_travel_as_json() {
        let mut context = Context::default();
        let value = context
            .eval(Source::from_bytes("({ proxy: 'a:80', ports: [1, 2] })"))
            .unwrap();
        assert_eq!(
            to_host(&value, &mut context).unwrap(),
            HostValue::Json(serde_json::json!({ "proxy": "a:80", "ports": [1, 2] }))
        );
    }

    #[test]
    fn test_thrown_errors_keep_name_and_message() {
        let mut context = Context::default();
        let err = context
            .eval(Source::from_bytes("throw new TypeError('bad host')"))
            .unwrap_err();
        let script = from_js_error(err, &mut context);
        assert_eq!(script.name, "TypeError");
        assert_eq!(script.message, "bad host");
        assert!(script.stack.starts_with("TypeError: bad host"));
    }

    #[test]
    fn test_thrown_primitive_becomes_error() {
        let mut context = Context::default();
        let err = context.eval(Source::from_bytes("throw 'nope'")).unwrap_err();
        let script = from_js_error(err, &mut context);
        assert_eq!(script.name, "Error");
        assert_eq!(script.message, "nope");
    }

    #[test]
    fn test_type_names() {
        let mut context = Context::default();
        let f = context.eval(Source::from_bytes("(function () {})")).unwrap();
        assert_eq!(type_name(&f), "function");
        assert_eq!(type_name(&JsValue::undefined()), "undefined");
        assert_eq!(type_name(&JsValue::null()), "object");
        assert_eq!(type_name(&JsValue::from(1)), "number");
    }
}
