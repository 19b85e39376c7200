use mongodb::bson::{self, Document};
use mongodb::sync::{Client, Database};
use serde_json::Value as JsonValue;
use silo_core::{
    Connection, ConnectionUrl, DbError, DocumentCollection, DocumentConnection, ErrorKind, Result,
};
use std::sync::{Arc, Mutex, Weak};

pub(crate) fn from_mongo_error(mark: &'static str, error: mongodb::error::Error) -> DbError {
    DbError::backend(mark, "mongodb", error.to_string())
}

fn to_document(mark: &'static str, value: &JsonValue) -> Result<Document> {
    bson::to_document(value).map_err(|e| {
        DbError::new(
            mark,
            ErrorKind::ParseError,
            format!("value is not a JSON document: {e}"),
        )
    })
}

fn to_json(mark: &'static str, document: &Document) -> Result<JsonValue> {
    serde_json::to_value(document).map_err(|e| {
        DbError::new(
            mark,
            ErrorKind::ParseError,
            format!("reply is not convertible to JSON: {e}"),
        )
    })
}

pub(crate) struct MongoCore {
    url: String,
    database: String,
    client: Mutex<Option<Client>>,
}

impl MongoCore {
    /// Database handle, failing once the connection is closed.
    fn database(&self) -> Result<Database> {
        let client = self.client.lock().expect("mongodb client poisoned");
        match client.as_ref() {
            Some(client) => Ok(client.database(&self.database)),
            None => Err(DbError::new(
                "T6WQ2NHVY8KD",
                ErrorKind::ConnectionClosed,
                "mongodb connection is closed",
            )),
        }
    }
}

/// Open MongoDB session scoped to one database.
pub struct MongoConnection {
    core: Arc<MongoCore>,
}

impl MongoConnection {
    pub(crate) fn open(url: &ConnectionUrl) -> Result<Self> {
        let auth = match (url.username(), url.password()) {
            (Some(user), Some(password)) => format!("{user}:{password}@"),
            (Some(user), None) => format!("{user}@"),
            _ => String::new(),
        };
        let native_url = format!(
            "mongodb://{auth}{}:{}/",
            url.host(),
            url.port().unwrap_or(27017)
        );
        let client = Client::with_uri_str(&native_url).map_err(|e| {
            let error = DbError::new(
                "R4ZJ7EBSM1XF",
                ErrorKind::ConnectFailure,
                format!("cannot connect to mongodb: {e}"),
            );
            log::error!("{error}");
            error
        })?;
        let database = if url.target().is_empty() {
            "admin".to_string()
        } else {
            url.target().to_string()
        };
        log::debug!("connected to mongodb at {}", url.authority(27017));
        Ok(Self {
            core: Arc::new(MongoCore {
                url: url.as_str().to_string(),
                database,
                client: Mutex::new(Some(client)),
            }),
        })
    }
}

impl Connection for MongoConnection {
    fn url(&self) -> &str {
        &self.core.url
    }

    fn is_closed(&self) -> bool {
        self.core
            .client
            .lock()
            .expect("mongodb client poisoned")
            .is_none()
    }

    fn close(&self) -> Result<()> {
        // Dropping the client tears down the session pool it owns.
        self.core
            .client
            .lock()
            .expect("mongodb client poisoned")
            .take();
        Ok(())
    }

    fn reset_for_pool(&self) -> Result<()> {
        // Document sessions carry no auto-commit or isolation state; being
        // open is all the reset requires.
        self.core.database()?;
        Ok(())
    }
}

impl DocumentConnection for MongoConnection {
    fn collection(&self, name: &str) -> Result<Box<dyn DocumentCollection>> {
        self.core.database()?;
        Ok(Box::new(MongoCollection {
            core: Arc::downgrade(&self.core),
            name: name.to_string(),
        }))
    }

    fn create_collection(&self, name: &str) -> Result<()> {
        self.core
            .database()?
            .create_collection(name)
            .run()
            .map_err(|e| from_mongo_error("W9GK5TXCA3PN", e))
    }

    fn collection_exists(&self, name: &str) -> Result<bool> {
        let names = self
            .core
            .database()?
            .list_collection_names()
            .run()
            .map_err(|e| from_mongo_error("L2DY8QMRJ6VB", e))?;
        Ok(names.iter().any(|n| n == name))
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        self.core
            .database()?
            .collection::<Document>(name)
            .drop()
            .run()
            .map_err(|e| from_mongo_error("F7SN1UWEH0ZQ", e))
    }

    fn run_command(&self, command: JsonValue) -> Result<JsonValue> {
        let doc = to_document("X3BV6KJGT9CW", &command)?;
        let reply = self
            .core
            .database()?
            .run_command(doc)
            .run()
            .map_err(|e| from_mongo_error("E8MH4RZQL1SY", e))?;
        to_json("N5CT0AFXD7UJ", &reply)
    }

    fn create_document(&self, collection: &str, document: JsonValue) -> Result<String> {
        MongoCollection {
            core: Arc::downgrade(&self.core),
            name: collection.to_string(),
        }
        .insert_one(document)
    }
}

impl Drop for MongoConnection {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::warn!("error closing mongodb connection in drop: {error}");
        }
    }
}

/// Handle to one collection; re-derives from the connection core per
/// operation so a closed connection invalidates it immediately.
pub struct MongoCollection {
    core: Weak<MongoCore>,
    name: String,
}

impl MongoCollection {
    fn collection(&self) -> Result<mongodb::sync::Collection<Document>> {
        let core = self.core.upgrade().ok_or_else(|| {
            DbError::new(
                "Q1PR9VYBW4EM",
                ErrorKind::ConnectionClosed,
                "owning connection is gone",
            )
        })?;
        Ok(core.database()?.collection(&self.name))
    }
}

impl DocumentCollection for MongoCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_one(&self, document: JsonValue) -> Result<String> {
        let doc = to_document("D0KX5SHNU2GA", &document)?;
        let outcome = self
            .collection()?
            .insert_one(doc)
            .run()
            .map_err(|e| from_mongo_error("Y7LW3CQJZ8TB", e))?;
        Ok(outcome.inserted_id.to_string())
    }

    fn find(&self, filter: JsonValue) -> Result<Vec<JsonValue>> {
        let filter = to_document("U4EJ8BMKR1FH", &filter)?;
        let cursor = self
            .collection()?
            .find(filter)
            .run()
            .map_err(|e| from_mongo_error("H6TA2XWDQ9NC", e))?;
        let mut documents = Vec::new();
        for document in cursor {
            let document = document.map_err(|e| from_mongo_error("S9FQ4GVEL3KP", e))?;
            documents.push(to_json("J2NB7YRUM5XW", &document)?);
        }
        Ok(documents)
    }

    fn update_many(&self, filter: JsonValue, update: JsonValue) -> Result<u64> {
        let filter = to_document("A8CW1THLK4QE", &filter)?;
        let update = to_document("V5MJ9DZSN0RY", &update)?;
        let outcome = self
            .collection()?
            .update_many(filter, update)
            .run()
            .map_err(|e| from_mongo_error("B3GX6PEVC8UA", e))?;
        Ok(outcome.modified_count)
    }

    fn delete_many(&self, filter: JsonValue) -> Result<u64> {
        let filter = to_document("K7RZ0WQYF2DM", &filter)?;
        let outcome = self
            .collection()?
            .delete_many(filter)
            .run()
            .map_err(|e| from_mongo_error("G4US8JNBT6HL", e))?;
        Ok(outcome.deleted_count)
    }

    fn count(&self, filter: JsonValue) -> Result<u64> {
        let filter = to_document("Z1EY5KCRX9VQ", &filter)?;
        self.collection()?
            .count_documents(filter)
            .run()
            .map_err(|e| from_mongo_error("C6HD3MWAJ0SF", e))
    }
}
