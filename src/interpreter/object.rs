//! The object/property model seam. The core only ever reaches properties
//! through `ObjectModel`, so an embedder can supply exotic objects or
//! accessors without the control-flow core knowing about them.

use super::*;

pub trait ObjectModel {
    /// [[Get]]
    fn get(&self, agent: &Agent, object: JsObject, key: &str, receiver: &JsValue) -> Completion;

    /// [[Set]]
    fn set(
        &self,
        agent: &Agent,
        object: JsObject,
        key: &str,
        value: JsValue,
        receiver: &JsValue,
    ) -> Completion<bool>;

    /// [[HasProperty]]
    fn has_property(&self, agent: &Agent, object: JsObject, key: &str) -> Completion<bool>;

    /// DefinePropertyOrThrow
    fn define_property_or_throw(
        &self,
        agent: &Agent,
        object: JsObject,
        key: &str,
        desc: PropertyDescriptor,
    ) -> Completion<()>;

    /// [[GetPrototypeOf]]
    fn get_prototype_of(&self, agent: &Agent, object: JsObject) -> Completion<Option<JsObject>>;
}

/// Ordinary objects with data properties over the agent's arena.
#[derive(Debug, Default)]
pub struct OrdinaryObjects;

impl ObjectModel for OrdinaryObjects {
    // §10.1.8.1 OrdinaryGet
    fn get(&self, agent: &Agent, object: JsObject, key: &str, _receiver: &JsValue) -> Completion {
        let heap = agent.heap();
        let mut current = Some(object);
        while let Some(obj) = current {
            let data = heap.get(obj);
            if let Some(desc) = data.properties.get(key) {
                return Completion::Normal(desc.value.clone());
            }
            current = data.prototype;
        }
        Completion::Normal(JsValue::Undefined)
    }

    // §10.1.9.2 OrdinarySetWithOwnDescriptor, data properties only
    fn set(
        &self,
        agent: &Agent,
        object: JsObject,
        key: &str,
        value: JsValue,
        receiver: &JsValue,
    ) -> Completion<bool> {
        let writable = {
            let heap = agent.heap();
            let mut current = Some(object);
            let mut writable = true;
            while let Some(obj) = current {
                let data = heap.get(obj);
                if let Some(desc) = data.properties.get(key) {
                    writable = desc.writable;
                    break;
                }
                current = data.prototype;
            }
            writable
        };
        if !writable {
            return Completion::Normal(false);
        }
        let Some(target) = receiver.as_object() else {
            return Completion::Normal(false);
        };
        let mut heap = agent.heap_mut();
        let data = heap.get_mut(target);
        if let Some(desc) = data.properties.get_mut(key) {
            if !desc.writable {
                return Completion::Normal(false);
            }
            desc.value = value;
            return Completion::Normal(true);
        }
        if !data.extensible {
            return Completion::Normal(false);
        }
        data.properties
            .insert(key.to_string(), PropertyDescriptor::data(value));
        Completion::Normal(true)
    }

    fn has_property(&self, agent: &Agent, object: JsObject, key: &str) -> Completion<bool> {
        let heap = agent.heap();
        let mut current = Some(object);
        while let Some(obj) = current {
            let data = heap.get(obj);
            if data.properties.contains_key(key) {
                return Completion::Normal(true);
            }
            current = data.prototype;
        }
        Completion::Normal(false)
    }

    fn define_property_or_throw(
        &self,
        agent: &Agent,
        object: JsObject,
        key: &str,
        desc: PropertyDescriptor,
    ) -> Completion<()> {
        let rejected = {
            let mut heap = agent.heap_mut();
            let data = heap.get_mut(object);
            match data.properties.get(key) {
                Some(existing) if !existing.configurable => true,
                None if !data.extensible => true,
                _ => {
                    data.properties.insert(key.to_string(), desc);
                    false
                }
            }
        };
        if rejected {
            return agent.throw_type_error(&format!("Cannot define property {key}"));
        }
        Completion::Normal(())
    }

    fn get_prototype_of(&self, agent: &Agent, object: JsObject) -> Completion<Option<JsObject>> {
        Completion::Normal(agent.heap().get(object).prototype)
    }
}

impl Agent {
    // §7.3.2 Get
    pub(crate) fn get(&self, object: JsObject, key: &str) -> Completion {
        let model = self.object_model();
        model.get(self, object, key, &JsValue::Object(object))
    }

    // §7.3.3 GetV
    pub(crate) fn get_v(&self, value: &JsValue, key: &str) -> Completion {
        match value {
            JsValue::Object(obj) => self.get(*obj, key),
            JsValue::Undefined | JsValue::Null => self.throw_type_error(&format!(
                "Cannot read properties of {value} (reading '{key}')"
            )),
            JsValue::String(s) if key == "length" => {
                Completion::Normal(JsValue::Number(s.len() as f64))
            }
            _ => Completion::Normal(JsValue::Undefined),
        }
    }

    // §7.3.4 Set
    pub(crate) fn set(&self, object: JsObject, key: &str, value: JsValue) -> Completion<()> {
        let model = self.object_model();
        let ok = crate::q!(model.set(self, object, key, value, &JsValue::Object(object)));
        if !ok {
            return self.throw_type_error(&format!(
                "Cannot assign to read only property '{key}' of object"
            ));
        }
        Completion::Normal(())
    }

    pub(crate) fn has_property(&self, object: JsObject, key: &str) -> Completion<bool> {
        let model = self.object_model();
        model.has_property(self, object, key)
    }

    pub(crate) fn define_property_or_throw(
        &self,
        object: JsObject,
        key: &str,
        desc: PropertyDescriptor,
    ) -> Completion<()> {
        let model = self.object_model();
        model.define_property_or_throw(self, object, key, desc)
    }

    pub(crate) fn get_prototype_of(&self, object: JsObject) -> Completion<Option<JsObject>> {
        let model = self.object_model();
        model.get_prototype_of(self, object)
    }

    // §7.3.7 CreateDataPropertyOrThrow
    pub(crate) fn create_data_property_or_throw(
        &self,
        object: JsObject,
        key: &str,
        value: JsValue,
    ) -> Completion<()> {
        self.define_property_or_throw(object, key, PropertyDescriptor::data(value))
    }

    /// Install a builtin-owned property on a fresh object. Cannot fail.
    pub(crate) fn define_hidden(&self, object: JsObject, key: &str, value: JsValue) {
        crate::x!(self.define_property_or_throw(object, key, PropertyDescriptor::hidden(value)));
    }

    // §7.3.11 GetMethod
    pub(crate) fn get_method(&self, value: &JsValue, key: &str) -> Completion {
        let func = crate::q!(self.get_v(value, key));
        if func.is_nullish() {
            return Completion::Normal(JsValue::Undefined);
        }
        if !self.is_callable(&func) {
            return self.throw_type_error(&format!("{key} is not a function"));
        }
        Completion::Normal(func)
    }
}
