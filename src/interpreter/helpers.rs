use super::*;
use crate::types::number_ops;

// §7.1.2 ToBoolean
pub(crate) fn to_boolean(val: &JsValue) -> bool {
    match val {
        JsValue::Undefined | JsValue::Null => false,
        JsValue::Boolean(b) => *b,
        JsValue::Number(n) => *n != 0.0 && !n.is_nan(),
        JsValue::String(s) => !s.is_empty(),
        JsValue::Object(_) => true,
    }
}

// §7.1.4 ToNumber, primitives only; objects are NaN without a ToPrimitive hook.
pub(crate) fn to_number(val: &JsValue) -> f64 {
    match val {
        JsValue::Undefined => f64::NAN,
        JsValue::Null => 0.0,
        JsValue::Boolean(b) => *b as u8 as f64,
        JsValue::Number(n) => *n,
        JsValue::String(s) => string_to_number(s),
        JsValue::Object(_) => f64::NAN,
    }
}

fn string_to_number(s: &JsString) -> f64 {
    let rust_str = s.to_rust_string();
    let trimmed = rust_str.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.to_ascii_lowercase().contains("inf")
            || trimmed.to_ascii_lowercase().contains("nan") =>
        {
            f64::NAN
        }
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

// §7.1.17 ToString
pub(crate) fn to_js_string(val: &JsValue) -> JsString {
    match val {
        JsValue::String(s) => s.clone(),
        other => JsString::from_str(&other.to_string()),
    }
}

pub(crate) fn same_value(left: &JsValue, right: &JsValue) -> bool {
    match (left, right) {
        (JsValue::Number(a), JsValue::Number(b)) => number_ops::same_value(*a, *b),
        _ => strict_equality(left, right),
    }
}

// §7.2.15 IsStrictlyEqual
pub(crate) fn strict_equality(left: &JsValue, right: &JsValue) -> bool {
    match (left, right) {
        (JsValue::Undefined, JsValue::Undefined) | (JsValue::Null, JsValue::Null) => true,
        (JsValue::Number(a), JsValue::Number(b)) => number_ops::equal(*a, *b),
        (JsValue::String(a), JsValue::String(b)) => a == b,
        (JsValue::Boolean(a), JsValue::Boolean(b)) => a == b,
        (JsValue::Object(a), JsValue::Object(b)) => a == b,
        _ => false,
    }
}

// §7.2.13 IsLessThan, on numbers and strings
pub(crate) fn less_than(left: &JsValue, right: &JsValue) -> Option<bool> {
    if let (JsValue::String(a), JsValue::String(b)) = (left, right) {
        return Some(a.code_units < b.code_units);
    }
    number_ops::less_than(to_number(left), to_number(right))
}

impl Agent {
    // §13.5.3 typeof
    pub(crate) fn typeof_val(&self, val: &JsValue) -> &'static str {
        match val {
            JsValue::Undefined => "undefined",
            JsValue::Null => "object",
            JsValue::Boolean(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::String(_) => "string",
            JsValue::Object(_) if self.is_callable(val) => "function",
            JsValue::Object(_) => "object",
        }
    }

    // §7.2.3 IsCallable
    pub(crate) fn is_callable(&self, val: &JsValue) -> bool {
        match val {
            JsValue::Object(obj) => self.heap().get(*obj).function_data().is_some(),
            _ => false,
        }
    }

    // §7.2.4 IsConstructor
    pub(crate) fn is_constructor(&self, val: &JsValue) -> bool {
        let JsValue::Object(obj) = val else {
            return false;
        };
        let heap = self.heap();
        match heap.get(*obj).function_data().map(|f| &f.behavior) {
            Some(FunctionBehavior::Builtin { construct, .. }) => construct.is_some(),
            Some(FunctionBehavior::Ecmascript(func)) => {
                func.this_mode == ThisMode::NonLexical && func.node.kind == FunctionKind::Normal
            }
            None => false,
        }
    }

    pub(crate) fn is_promise(&self, val: &JsValue) -> bool {
        match val {
            JsValue::Object(obj) => matches!(self.heap().get(*obj).kind, ObjectKind::Promise(_)),
            _ => false,
        }
    }

    // §7.3.24 GetFunctionRealm
    pub(crate) fn get_function_realm(&self, func: JsObject) -> RealmId {
        let heap = self.heap();
        match heap.get(func).function_data() {
            Some(data) => data.realm,
            None => self.current_realm(),
        }
    }

    pub(crate) fn create_error(&self, prototype: JsObject, message: &str) -> JsValue {
        let obj = self.allocate(ObjectData::new(Some(prototype), ObjectKind::Error));
        self.define_hidden(obj, "message", JsValue::string(message));
        JsValue::Object(obj)
    }

    pub(crate) fn create_type_error(&self, message: &str) -> JsValue {
        self.create_error(self.intrinsics().type_error_prototype, message)
    }

    pub(crate) fn throw_type_error<T>(&self, message: &str) -> Completion<T> {
        Completion::Throw(self.create_type_error(message))
    }

    pub(crate) fn throw_reference_error<T>(&self, message: &str) -> Completion<T> {
        let proto = self.intrinsics().reference_error_prototype;
        Completion::Throw(self.create_error(proto, message))
    }

    /// Short description of a value for error messages.
    pub(crate) fn describe(&self, val: &JsValue) -> String {
        match val {
            JsValue::String(s) => format!("\"{s}\""),
            JsValue::Object(obj) => {
                let heap = self.heap();
                match heap.get(*obj).function_data() {
                    Some(f) if !f.name.is_empty() => format!("function {}", f.name),
                    Some(_) => "function".to_string(),
                    None => "object".to_string(),
                }
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_boolean_follows_falsy_values() {
        assert!(!to_boolean(&JsValue::Undefined));
        assert!(!to_boolean(&JsValue::Number(f64::NAN)));
        assert!(!to_boolean(&JsValue::string("")));
        assert!(to_boolean(&JsValue::string("0")));
        assert!(to_boolean(&JsValue::Object(JsObject { id: 0 })));
    }

    #[test]
    fn to_number_parses_strings() {
        assert_eq!(to_number(&JsValue::string(" 42 ")), 42.0);
        assert_eq!(to_number(&JsValue::string("")), 0.0);
        assert!(to_number(&JsValue::string("abc")).is_nan());
        assert!(to_number(&JsValue::string("inf")).is_nan());
        assert_eq!(to_number(&JsValue::string("-Infinity")), f64::NEG_INFINITY);
        assert_eq!(to_number(&JsValue::Boolean(true)), 1.0);
    }

    #[test]
    fn strict_equality_distinguishes_types() {
        assert!(!strict_equality(&JsValue::Number(1.0), &JsValue::string("1")));
        assert!(!strict_equality(&JsValue::Number(f64::NAN), &JsValue::Number(f64::NAN)));
        assert!(strict_equality(&JsValue::Number(0.0), &JsValue::Number(-0.0)));
        assert!(same_value(&JsValue::Number(f64::NAN), &JsValue::Number(f64::NAN)));
        assert!(!same_value(&JsValue::Number(0.0), &JsValue::Number(-0.0)));
    }

    #[test]
    fn string_comparison_uses_code_units() {
        assert_eq!(less_than(&JsValue::string("a"), &JsValue::string("b")), Some(true));
        assert_eq!(less_than(&JsValue::Number(1.0), &JsValue::Number(f64::NAN)), None);
    }

    #[test]
    fn type_errors_carry_their_message() {
        let agent = Agent::new(AgentOptions::default());
        let Completion::Throw(err) = agent.throw_type_error::<JsValue>("bad") else {
            panic!("expected throw");
        };
        assert_eq!(agent.error_message(&err).as_deref(), Some("bad"));
        let proto = agent.heap().get(err.as_object().unwrap()).prototype;
        assert_eq!(proto, Some(agent.intrinsics().type_error_prototype));
    }
}
