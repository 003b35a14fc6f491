use super::error::{self, Result};
use super::DeployManager;
use crate::clients::{HttpStatusCode, ObjectStore, StatusCode};
use crate::schema::{crd_name, read_crd};
use crate::system::{session_namespace, SessionScope};
use crate::{Object, ObjectGraph, ObjectKind};
use k8s_openapi::api::core::v1::Service;
use log::{debug, info, trace};
use snafu::ResultExt;
use std::path::Path;

/// The objects of a graph as the store returned them, in submission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    objects: Vec<Object>,
}

impl Applied {
    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    pub fn find(&self, kind: ObjectKind, name: &str) -> Option<&Object> {
        self.objects
            .iter()
            .find(|object| object.kind() == kind && object.name() == name)
    }

    /// The service `name` with its store-assigned fields, such as allocated node ports.
    pub fn service(&self, name: &str) -> Option<&Service> {
        match self.find(ObjectKind::Service, name) {
            Some(Object::Service(service)) => Some(service),
            _ => None,
        }
    }

    /// A graph naming exactly what was created, including generated names, suitable for
    /// deletion.
    pub fn to_graph(&self) -> ObjectGraph {
        let mut graph = ObjectGraph::new();
        for object in &self.objects {
            graph.push(object.clone());
        }
        graph
    }
}

/// The outcome of registering a custom resource definition file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrdRegistration {
    pub name: String,
    /// `false` when the definition was already registered, e.g. by a concurrent session. It then
    /// belongs to whoever created it and must not be deleted by this session.
    pub created: bool,
}

impl<S: ObjectStore> DeployManager<S> {
    /// Submit every object of `graph` in ascending rank order. The first rejection stops the
    /// submission; objects created before it are left in place.
    pub async fn apply(&self, graph: &ObjectGraph) -> Result<Applied> {
        let mut applied = Applied::default();
        for object in graph.apply_order() {
            applied.objects.push(self.create(object).await?);
        }
        debug!("applied {} objects", applied.objects.len());
        Ok(applied)
    }

    /// Submit a single object.
    pub async fn create(&self, object: &Object) -> Result<Object> {
        trace!("creating {}", object.object_ref());
        self.store
            .create(object)
            .await
            .context(error::CreateSnafu {
                object: object.object_ref(),
            })
    }

    /// Create a namespace named `<base_name>-<random suffix>` and return its scope.
    pub async fn create_namespace(&self, base_name: &str) -> Result<SessionScope> {
        match self.create(&session_namespace(base_name).into()).await? {
            Object::Namespace(namespace) => {
                SessionScope::from_namespace(&namespace).context(error::ModelSnafu)
            }
            other => error::UnexpectedKindSnafu {
                expected: ObjectKind::Namespace,
                actual: other.kind(),
            }
            .fail(),
        }
    }

    /// Decode the custom resource definition in `path` and submit it, owned by the session
    /// namespace so that it is collected with it. A definition that already exists is reported
    /// as not created rather than as a conflict.
    pub async fn create_crd_file<P: AsRef<Path>>(
        &self,
        scope: &SessionScope,
        path: P,
    ) -> Result<CrdRegistration> {
        let mut crd = read_crd(path).await.context(error::ModelSnafu)?;
        scope.adopt(&mut crd.metadata);
        let name = crd_name(&crd).to_string();
        let object = Object::from(crd);
        match self.store.create(&object).await {
            Ok(_) => Ok(CrdRegistration {
                name,
                created: true,
            }),
            Err(e) if e.is_status_code(StatusCode::CONFLICT) => {
                info!("custom resource definition '{}' is already registered", name);
                Ok(CrdRegistration {
                    name,
                    created: false,
                })
            }
            Err(e) => Err(e).context(error::CreateSnafu {
                object: object.object_ref(),
            }),
        }
    }
}
