//! Registered datastore services and their YAML-backed registry.
//!
//! A [`Service`] describes where a warehouse lives and how to reach it; the
//! optimizer and the loader never see connection details, only the
//! `Box<dyn Datastore>` that [`Service::datastore`] resolves to.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    datastore::{BackendKind, Datastore, PostgresDatastore},
    error::{Error, Result},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub id: u64,
    /// Backend type string, e.g. `postgres`.
    pub backend: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Database name on the server.
    pub database: String,
    /// Classification of the service, e.g. `warehouse` or `staging`.
    pub group: String,
    /// Local directory or `user@host:/dir` readable by the database server.
    pub staging_directory: String,
    /// Treat `DROP TABLE` on a missing table as success.
    #[serde(default)]
    pub drop_missing_ok: bool,
}

impl Service {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("host", &self.host),
            ("username", &self.username),
            ("password", &self.password),
            ("database", &self.database),
            ("group", &self.group),
            ("staging directory", &self.staging_directory),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(Error::InvalidService(format!("{field} can't be empty")));
        }
        if self.port == 0 {
            return Err(Error::InvalidService("port should be a valid number".into()));
        }
        self.backend_kind()?;
        Ok(())
    }

    pub fn backend_kind(&self) -> Result<BackendKind> {
        self.backend.parse()
    }

    /// Opens a live datastore handle for this service.
    pub fn datastore(&self) -> Result<Box<dyn Datastore>> {
        match self.backend_kind()? {
            BackendKind::Postgres => Ok(Box::new(PostgresDatastore::connect(self)?)),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    services: Vec<Service>,
}

#[derive(Debug)]
pub struct ServiceRegistry {
    path: PathBuf,
    services: Vec<Service>,
}

impl ServiceRegistry {
    /// Loads the registry at `path`; a missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        let services = match fs::read_to_string(path) {
            Ok(contents) => {
                let file: RegistryFile = serde_yaml::from_str(&contents).map_err(|err| {
                    Error::metadata_with(format!("parsing service registry {path:?}"), err)
                })?;
                file.services
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                return Err(Error::metadata_with(
                    format!("reading service registry {path:?}"),
                    err,
                ));
            }
        };
        debug!("Loaded {} service(s) from {path:?}", services.len());
        Ok(Self {
            path: path.to_path_buf(),
            services,
        })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                Error::metadata_with(format!("creating directory {parent:?}"), err)
            })?;
        }
        let file = RegistryFile {
            services: self.services.clone(),
        };
        let yaml = serde_yaml::to_string(&file)
            .map_err(|err| Error::metadata_with("serializing service registry", err))?;
        fs::write(&self.path, yaml).map_err(|err| {
            Error::metadata_with(format!("writing service registry {:?}", self.path), err)
        })
    }

    pub fn all(&self) -> &[Service] {
        &self.services
    }

    pub fn get(&self, id: u64) -> Result<&Service> {
        self.services
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::metadata(format!("service {id} not found")))
    }

    /// Validates and registers `service` under the next free id.
    pub fn create(&mut self, mut service: Service) -> Result<&Service> {
        service.validate()?;
        service.id = self.services.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        info!(
            "Registered {} service {} at {}:{}",
            service.backend, service.id, service.host, service.port
        );
        self.services.push(service);
        self.services
            .last()
            .ok_or_else(|| Error::metadata("service registry is empty after insert"))
    }

    pub fn update(&mut self, service: Service) -> Result<()> {
        service.validate()?;
        let slot = self
            .services
            .iter_mut()
            .find(|s| s.id == service.id)
            .ok_or_else(|| Error::metadata(format!("service {} not found", service.id)))?;
        *slot = service;
        Ok(())
    }

    pub fn delete(&mut self, id: u64) -> Result<Service> {
        let position = self
            .services
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| Error::metadata(format!("service {id} not found")))?;
        info!("Removed service {id}");
        Ok(self.services.remove(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> Service {
        Service {
            id: 0,
            backend: "postgres".into(),
            host: "localhost".into(),
            port: 5432,
            username: "loader".into(),
            password: "secret".into(),
            database: "warehouse".into(),
            group: "analytics".into(),
            staging_directory: "/tmp/stage".into(),
            drop_missing_ok: false,
        }
    }

    #[test]
    fn validate_reports_the_first_empty_field() {
        let mut svc = service();
        svc.username = " ".into();
        let err = svc.validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid datastore service: username can't be empty");
    }

    #[test]
    fn validate_rejects_zero_port_and_unknown_backend() {
        let mut svc = service();
        svc.port = 0;
        assert!(matches!(svc.validate(), Err(Error::InvalidService(_))));
        let mut svc = service();
        svc.backend = "oracle".into();
        assert!(matches!(svc.validate(), Err(Error::UnsupportedBackend(_))));
    }

    #[test]
    fn create_assigns_increasing_ids() {
        let mut registry = ServiceRegistry {
            path: PathBuf::from("unused.yaml"),
            services: Vec::new(),
        };
        assert_eq!(registry.create(service()).unwrap().id, 1);
        assert_eq!(registry.create(service()).unwrap().id, 2);
        registry.delete(1).unwrap();
        assert_eq!(registry.create(service()).unwrap().id, 3);
    }
}
