// Copyright 2025 Islet Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Native bindings installed into every isolate.
//!
//! Render bundles routinely log through `console`, which Boa does not provide
//! by default. The `console` object installed here forwards each call to a
//! `tracing` event under the `islet::js` target so script output lands in the
//! same log stream as the server's own events.
//!
//! | JavaScript        | tracing level |
//! |-------------------|---------------|
//! | `console.debug`   | DEBUG         |
//! | `console.log`     | INFO          |
//! | `console.info`    | INFO          |
//! | `console.warn`    | WARN          |
//! | `console.error`   | ERROR         |

use boa_engine::{
    js_string, object::ObjectInitializer, property::Attribute, Context, JsResult, JsValue,
    NativeFunction,
};
use islet_common::{IsletError, Result};

/// Joins console arguments the way browsers do: strings verbatim, objects as
/// JSON when they can be serialized.
fn format_console_args(args: &[JsValue], ctx: &mut Context) -> JsResult<String> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        if arg.is_object() {
            if let Ok(json) = arg.to_json(ctx) {
                parts.push(json.to_string());
                continue;
            }
        }
        parts.push(arg.to_string(ctx)?.to_std_string_escaped());
    }
    Ok(parts.join(" "))
}

fn console_debug(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let message = format_console_args(args, ctx)?;
    tracing::debug!(target: "islet::js", "{}", message);
    Ok(JsValue::undefined())
}

fn console_info(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let message = format_console_args(args, ctx)?;
    tracing::info!(target: "islet::js", "{}", message);
    Ok(JsValue::undefined())
}

fn console_warn(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let message = format_console_args(args, ctx)?;
    tracing::warn!(target: "islet::js", "{}", message);
    Ok(JsValue::undefined())
}

fn console_error(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let message = format_console_args(args, ctx)?;
    tracing::error!(target: "islet::js", "{}", message);
    Ok(JsValue::undefined())
}

/// Installs the global `console` object.
///
/// Must run before the render bundle is evaluated, since bundles may log at
/// module-evaluation time.
pub(crate) fn install_console(ctx: &mut Context) -> Result<()> {
    let console = ObjectInitializer::new(ctx)
        .function(NativeFunction::from_fn_ptr(console_debug), js_string!("debug"), 0)
        .function(NativeFunction::from_fn_ptr(console_info), js_string!("log"), 0)
        .function(NativeFunction::from_fn_ptr(console_info), js_string!("info"), 0)
        .function(NativeFunction::from_fn_ptr(console_warn), js_string!("warn"), 0)
        .function(NativeFunction::from_fn_ptr(console_error), js_string!("error"), 0)
        .build();

    ctx.register_global_property(js_string!("console"), console, Attribute::all())
        .map_err(|e| IsletError::IsolateInit(format!("Failed to install console: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::Source;

    #[test]
    fn test_console_is_callable() {
        let mut ctx = Context::default();
        install_console(&mut ctx).unwrap();

        let result = ctx
            .eval(Source::from_bytes(
                "console.log('hello', 1, {a: 1}); console.warn('careful'); typeof console.error",
            ))
            .unwrap();
        assert_eq!(
            result.to_string(&mut ctx).unwrap().to_std_string_escaped(),
            "function"
        );
    }

    #[test]
    fn test_console_returns_undefined() {
        let mut ctx = Context::default();
        install_console(&mut ctx).unwrap();

        let result = ctx.eval(Source::from_bytes("console.info('x')")).unwrap();
        assert!(result.is_undefined());
    }
}
