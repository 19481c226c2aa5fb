// used for persistence
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use rusqlite::types::Value as SqlValue;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::backend::{fixture_record, Backend, Criterion, Fixture, Record, Value};
use crate::error::Result;

// ------------- Record store -------------
/// A record store kept in SQLite. Every record is a (model, id) pair in `Record`,
/// and each of its properties is a JSON encoded value in `Property`.
pub struct SqliteBackend {
    db: Connection,
}

impl SqliteBackend {
    pub fn open(database: &str) -> Result<Self> {
        let connection = if database == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(Path::new(database))?
        };
        Self::new(connection)
    }
    pub fn new(connection: Connection) -> Result<Self> {
        // The "STRICT" keyword introduced in 3.37.0 breaks JDBC connections, which makes
        // debugging using an external tool like DBeaver impossible
        connection.execute_batch(
            "
            create table if not exists Record (
                Model text not null,
                Record_Identity integer not null,
                constraint referenceable_Record primary key (
                    Model,
                    Record_Identity
                )
            );-- STRICT;
            create table if not exists Property (
                Model text not null,
                Record_Identity integer not null,
                Property text not null,
                Value text not null,
                constraint Property_of_Record foreign key (
                    Model,
                    Record_Identity
                ) references Record(Model, Record_Identity),
                constraint unique_Property primary key (
                    Model,
                    Record_Identity,
                    Property
                )
            );-- STRICT;
            create index if not exists Property_by_Value on Property (
                Model,
                Property,
                Value
            );
            ",
        )?;
        Ok(Self { db: connection })
    }
    /// Inserts a record, replacing any earlier record with the same model and id.
    pub fn insert_record(&self, record: &Record) -> Result<()> {
        self.db
            .prepare_cached(
                "
                insert or ignore into Record (
                    Model,
                    Record_Identity
                ) values (?, ?)
            ",
            )?
            .execute(params![record.model(), record.id()])?;
        self.db
            .prepare_cached(
                "
                delete from Property
                    where Model = ?
                    and Record_Identity = ?
            ",
            )?
            .execute(params![record.model(), record.id()])?;
        let mut add_property = self.db.prepare_cached(
            "
                insert into Property (
                    Model,
                    Record_Identity,
                    Property,
                    Value
                ) values (?, ?, ?, ?)
            ",
        )?;
        for (property, value) in record.properties() {
            add_property.execute(params![
                record.model(),
                record.id(),
                property,
                serde_json::to_string(value)?
            ])?;
        }
        Ok(())
    }
    pub fn load_fixture(&self, fixture: &Fixture) -> Result<()> {
        let transaction = self.db.unchecked_transaction()?;
        for (model, rows) in fixture {
            for row in rows {
                self.insert_record(&fixture_record(model, row)?)?;
            }
        }
        transaction.commit()?;
        Ok(())
    }
    pub fn record_count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("select count(*) from Record", [], |row| row.get(0))?;
        Ok(count as usize)
    }
    fn restore_record(&self, model: &str, id: i64) -> Result<Record> {
        let mut statement = self.db.prepare_cached(
            "
                select Property, Value
                    from Property
                    where Model = ?
                    and Record_Identity = ?
            ",
        )?;
        let rows = statement.query_map(params![model, id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut properties = HashMap::new();
        for row in rows {
            let (property, value) = row?;
            properties.insert(property, serde_json::from_str::<Value>(&value)?);
        }
        Ok(Record::new(model, id, properties))
    }
}

impl fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.db.path())
            .finish()
    }
}

impl Backend for SqliteBackend {
    fn find_records(&self, model: &str, criteria: &[Criterion], limit: Option<usize>) -> Result<Vec<Record>> {
        let mut sql = String::from(
            "
                select r.Record_Identity
                    from Record r
                    where r.Model = ?",
        );
        let mut bindings: Vec<SqlValue> = vec![SqlValue::Text(model.to_string())];
        for criterion in criteria {
            if criterion.property == "id" {
                sql += "
                    and r.Record_Identity = ?";
                bindings.push(match criterion.value.as_integer() {
                    Some(id) => SqlValue::Integer(id),
                    None => SqlValue::Null,
                });
                continue;
            }
            sql += "
                    and exists (
                        select 1
                            from Property p
                            where p.Model = r.Model
                            and p.Record_Identity = r.Record_Identity
                            and p.Property = ?
                            and p.Value = ?
                    )";
            bindings.push(SqlValue::Text(criterion.property.clone()));
            bindings.push(SqlValue::Text(serde_json::to_string(&criterion.value)?));
        }
        sql += "
                    order by r.Record_Identity";
        if let Some(limit) = limit {
            sql += "
                    limit ?";
            bindings.push(SqlValue::Integer(limit as i64));
        }
        debug!(model, criteria = criteria.len(), "sqlite find");
        let ids = {
            let mut statement = self.db.prepare_cached(&sql)?;
            let rows = statement.query_map(params_from_iter(bindings), |row| row.get::<_, i64>(0))?;
            rows.collect::<std::result::Result<Vec<i64>, _>>()?
        };
        ids.into_iter().map(|id| self.restore_record(model, id)).collect()
    }
    fn get_record_by_id(&self, model: &str, id: i64) -> Result<Option<Record>> {
        let existing = self
            .db
            .prepare_cached(
                "
                select Record_Identity
                    from Record
                    where Model = ?
                    and Record_Identity = ?
            ",
            )?
            .query_row(params![model, id], |row| row.get::<_, i64>(0))
            .optional()?;
        match existing {
            Some(id) => Ok(Some(self.restore_record(model, id)?)),
            None => Ok(None),
        }
    }
}
