//! # Record Construction
//!
//! A `Record` is one row's worth of values, owned by the caller until it
//! is pushed into an append buffer. `RecordBuilder` offers type-checked
//! setters against a schema; `Record::from_values` is the shorthand when
//! the values are already assembled.
//!
//! Pushing a record into a buffer transfers ownership of the value. Any
//! sequences or text inside it are owned by the record itself, so data
//! built from temporaries stays valid for as long as the batch holds the
//! record.

use eyre::{ensure, Result};

use crate::records::schema::RecordSchema;
use crate::types::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    /// Builds a record from pre-assembled values, validating against the
    /// schema.
    pub fn from_values(schema: &RecordSchema, values: Vec<Value>) -> Result<Self> {
        let record = Self { values };
        schema.check_record(&record)?;
        Ok(record)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Mutable access to a field value, for callers that assemble
    /// sequences incrementally before pushing.
    pub fn value_mut(&mut self, idx: usize) -> Option<&mut Value> {
        self.values.get_mut(idx)
    }
}

pub struct RecordBuilder<'a> {
    schema: &'a RecordSchema,
    values: Vec<Option<Value>>,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(schema: &'a RecordSchema) -> Self {
        Self {
            schema,
            values: vec![None; schema.field_count()],
        }
    }

    /// Sets a field to any value matching its schema kind.
    pub fn set(&mut self, idx: usize, value: impl Into<Value>) -> Result<&mut Self> {
        let field = self
            .schema
            .field(idx)
            .ok_or_else(|| eyre::eyre!("field index {} out of range", idx))?;
        let value = value.into();
        ensure!(
            value.kind_matches(&field.kind),
            "field '{}': value kind {} does not match schema kind {:?}",
            field.name,
            value.describe(),
            field.kind
        );
        self.values[idx] = Some(value);
        Ok(self)
    }

    /// Sets a field by name.
    pub fn set_by_name(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let idx = self
            .schema
            .field_index(name)
            .ok_or_else(|| eyre::eyre!("no field named '{}'", name))?;
        self.set(idx, value)
    }

    pub fn set_bool(&mut self, idx: usize, v: bool) -> Result<&mut Self> {
        self.set(idx, v)
    }

    pub fn set_int2(&mut self, idx: usize, v: i16) -> Result<&mut Self> {
        self.set(idx, v)
    }

    pub fn set_int4(&mut self, idx: usize, v: i32) -> Result<&mut Self> {
        self.set(idx, v)
    }

    pub fn set_int8(&mut self, idx: usize, v: i64) -> Result<&mut Self> {
        self.set(idx, v)
    }

    pub fn set_float4(&mut self, idx: usize, v: f32) -> Result<&mut Self> {
        self.set(idx, v)
    }

    pub fn set_float8(&mut self, idx: usize, v: f64) -> Result<&mut Self> {
        self.set(idx, v)
    }

    pub fn set_text(&mut self, idx: usize, v: &str) -> Result<&mut Self> {
        self.set(idx, v)
    }

    pub fn set_seq(&mut self, idx: usize, items: Vec<Value>) -> Result<&mut Self> {
        self.set(idx, Value::Seq(items))
    }

    /// Consumes the builder, requiring every field to be set.
    pub fn finish(self) -> Result<Record> {
        let mut values = Vec::with_capacity(self.values.len());
        for (idx, slot) in self.values.into_iter().enumerate() {
            match slot {
                Some(value) => values.push(value),
                None => {
                    let name = &self.schema.field(idx).expect("index in range").name;
                    eyre::bail!("field '{}' (index {}) was never set", name, idx);
                }
            }
        }
        Record::from_values(self.schema, values)
    }
}
