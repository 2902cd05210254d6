//! Completion records (§6.2.4) and the `Q`/`X`/`UpdateEmpty` shorthands.
//!
//! `Normal` is generic so statement evaluation can carry an *empty* value
//! (`Completion<Option<JsValue>>`) while expressions always produce a value.
//! `Break`/`Continue` never carry a value; `Return`/`Throw` always do.

use crate::types::JsValue;

#[derive(Debug, Clone)]
pub enum Completion<T = JsValue> {
    Normal(T),
    Return(JsValue),
    Throw(JsValue),
    Break(Option<String>),
    Continue(Option<String>),
}

/// Completion of a statement list: the value slot may be empty.
pub type StatementCompletion = Completion<Option<JsValue>>;

impl<T> Completion<T> {
    pub fn is_abrupt(&self) -> bool {
        !matches!(self, Completion::Normal(_))
    }

    pub fn is_throw(&self) -> bool {
        matches!(self, Completion::Throw(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Completion::Normal(_) => "normal",
            Completion::Return(_) => "return",
            Completion::Throw(_) => "throw",
            Completion::Break(_) => "break",
            Completion::Continue(_) => "continue",
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Completion<U> {
        match self {
            Completion::Normal(v) => Completion::Normal(f(v)),
            Completion::Return(v) => Completion::Return(v),
            Completion::Throw(v) => Completion::Throw(v),
            Completion::Break(l) => Completion::Break(l),
            Completion::Continue(l) => Completion::Continue(l),
        }
    }

    /// Re-type an abrupt completion for propagation. Only `q!` should reach
    /// this with a normal completion, and it never does.
    pub fn into_abrupt<U>(self) -> Completion<U> {
        match self {
            Completion::Normal(_) => {
                crate::internal_error!("normal completion propagated as abrupt")
            }
            Completion::Return(v) => Completion::Return(v),
            Completion::Throw(v) => Completion::Throw(v),
            Completion::Break(l) => Completion::Break(l),
            Completion::Continue(l) => Completion::Continue(l),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Completion::Normal(v) => Some(v),
            _ => None,
        }
    }
}

impl Completion<Option<JsValue>> {
    /// §6.2.4.4 UpdateEmpty ( completionRecord, value )
    pub fn update_empty(self, value: Option<JsValue>) -> Self {
        match self {
            Completion::Normal(None) => Completion::Normal(value),
            other => other,
        }
    }
}

impl Completion<JsValue> {
    /// The value carried by a normal, return or throw completion.
    pub fn value(&self) -> Option<&JsValue> {
        match self {
            Completion::Normal(v) | Completion::Return(v) | Completion::Throw(v) => Some(v),
            Completion::Break(_) | Completion::Continue(_) => None,
        }
    }
}

impl<T> From<Result<T, JsValue>> for Completion<T> {
    fn from(r: Result<T, JsValue>) -> Self {
        match r {
            Ok(v) => Completion::Normal(v),
            Err(e) => Completion::Throw(e),
        }
    }
}

/// `Q(c)`: unwrap a normal completion or return the abrupt one from the
/// enclosing function (or async block) unchanged.
#[macro_export]
macro_rules! q {
    ($e:expr) => {
        match $e {
            $crate::completion::Completion::Normal(v) => v,
            abrupt => return abrupt.into_abrupt(),
        }
    };
}

/// `X(c)`: assert the completion is normal. An abrupt completion here is an
/// engine defect, never a catchable exception.
#[macro_export]
macro_rules! x {
    ($e:expr) => {
        match $e {
            $crate::completion::Completion::Normal(v) => v,
            abrupt => $crate::internal_error!(
                "X() received a {} completion",
                abrupt.kind_name()
            ),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double(c: Completion<f64>) -> Completion<f64> {
        let v = q!(c);
        Completion::Normal(v * 2.0)
    }

    #[test]
    fn q_unwraps_normal() {
        assert!(matches!(double(Completion::Normal(2.0)), Completion::Normal(v) if v == 4.0));
    }

    #[test]
    fn q_propagates_abrupt_unchanged() {
        let out = double(Completion::Throw(JsValue::string("boom")));
        assert!(matches!(out, Completion::Throw(JsValue::String(ref s)) if s.to_rust_string() == "boom"));
        let out = double(Completion::Break(Some("outer".into())));
        assert!(matches!(out, Completion::Break(Some(ref l)) if l == "outer"));
    }

    #[test]
    fn x_yields_normal_value() {
        let c: Completion<i32> = Completion::Normal(7);
        assert_eq!(x!(c), 7);
    }

    #[test]
    #[should_panic(expected = "X() received a throw completion")]
    fn x_on_abrupt_is_fatal() {
        let c: Completion<i32> = Completion::Throw(JsValue::Undefined);
        let _ = x!(c);
    }

    #[test]
    fn update_empty_fills_only_empty_normal() {
        let filled = Completion::Normal(None).update_empty(Some(JsValue::Number(1.0)));
        assert!(matches!(filled, Completion::Normal(Some(JsValue::Number(n))) if n == 1.0));

        let kept = Completion::Normal(Some(JsValue::Number(2.0))).update_empty(Some(JsValue::Null));
        assert!(matches!(kept, Completion::Normal(Some(JsValue::Number(n))) if n == 2.0));

        let brk: StatementCompletion = Completion::Break(None);
        assert!(matches!(brk.update_empty(Some(JsValue::Null)), Completion::Break(None)));
    }
}
