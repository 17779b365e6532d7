use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::config::XnatConfig;
use crate::discovery::{is_freesurfer_label, relative_resource_path, ResourceDiscovery};

/// XNAT wraps every listing in `{"ResultSet": {"Result": [...]}}`
#[derive(Debug, Deserialize)]
struct Listing<T> {
    #[serde(rename = "ResultSet")]
    result_set: ResultSet<T>,
}

#[derive(Debug, Deserialize)]
struct ResultSet<T> {
    #[serde(rename = "Result", default = "Vec::new")]
    result: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Experiment {
    #[serde(rename = "ID")]
    id: String,
    label: String,
}

#[derive(Debug, Deserialize)]
struct Resource {
    label: String,
}

#[derive(Debug, Deserialize)]
struct ResourceFile {
    #[serde(rename = "URI")]
    uri: String,
}

pub struct XnatClient {
    base: Url,
    user: Option<String>,
    password: Option<String>,
    http: Client,
    /// collections are downloaded into `<staging_dir>/freesurfer`
    staging_dir: PathBuf,
}

impl XnatClient {
    pub fn new(config: &XnatConfig, staging_dir: PathBuf) -> Result<Self> {
        // joining relative paths onto a base without a trailing slash would drop its last segment
        let mut raw = config.url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base = Url::parse(&raw).with_context(|| format!("Invalid XNAT url {}", config.url))?;
        let http = Client::builder().build().context("Building HTTP client")?;

        Ok(XnatClient {
            base,
            user: config.user.clone(),
            password: config.password.clone(),
            http,
            staging_dir,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("Invalid XNAT path {path}"))
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let request = self.http.get(url);
        match &self.user {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }

    fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut url = self.url(path)?;
        url.query_pairs_mut().append_pair("format", "json");
        let listing: Listing<T> = self
            .get(url.clone())
            .send()
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?
            .json()
            .with_context(|| format!("Decoding listing from {url}"))?;
        Ok(listing.result_set.result)
    }

    fn project_exists(&self, project: &str) -> Result<bool> {
        let mut url = self.url(&format!("data/projects/{project}"))?;
        url.query_pairs_mut().append_pair("format", "json");
        let response = self.get(url.clone()).send().with_context(|| format!("GET {url}"))?;
        Ok(response.status().is_success())
    }

    /// Stream one file to disk, creating its parent directories
    fn download(&self, uri: &str, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("Creating {}", parent.display()))?;
        }
        let url = self.url(uri)?;
        let mut response = self.get(url.clone()).send().with_context(|| format!("GET {url}"))?.error_for_status()?;
        let mut file = File::create(target).with_context(|| format!("Creating {}", target.display()))?;
        response.copy_to(&mut file).with_context(|| format!("Downloading {url}"))?;
        Ok(())
    }

    fn fetch_freesurfer(&self, project: &str, session: &str) -> Result<bool> {
        if !self.project_exists(project)? {
            warn!("Project {project} not found");
            return Ok(false);
        }

        let experiments: Vec<Experiment> = self.list(&format!("data/projects/{project}/experiments"))?;
        let experiment = match experiments.into_iter().find(|e| e.label == session) {
            Some(experiment) => experiment,
            None => {
                warn!("Session {session} not found in project {project}");
                return Ok(false);
            }
        };

        info!("Exploring resources for session {session}");
        let resources: Vec<Resource> = self.list(&format!("data/experiments/{}/resources", experiment.id))?;
        let resource = match resources.into_iter().find(|r| is_freesurfer_label(&r.label)) {
            Some(resource) => resource,
            None => {
                info!("No freesurfer resources found for session {session}");
                return Ok(false);
            }
        };

        let files: Vec<ResourceFile> =
            self.list(&format!("data/experiments/{}/resources/{}/files", experiment.id, resource.label))?;
        let target_dir = self.staging_dir.join("freesurfer");
        fs::create_dir_all(&target_dir).with_context(|| format!("Creating {}", target_dir.display()))?;

        for file in files {
            let relative = relative_resource_path(&file.uri)
                .ok_or_else(|| anyhow!("Refusing to download {} outside the resource", file.uri))?;
            info!("Downloading: {}", relative.display());
            self.download(&file.uri, &target_dir.join(relative))?;
        }

        info!("Copied freesurfer resources for session {session} into {}", target_dir.display());
        Ok(true)
    }
}

impl ResourceDiscovery for XnatClient {
    fn find_auxiliary_resources(&self, project: Option<&str>, session: &str) -> bool {
        let project = match project {
            Some(p) if !p.is_empty() => p,
            _ => {
                warn!("Project ID is required to look up freesurfer resources");
                return false;
            }
        };

        let result = if session.is_empty() {
            Err(anyhow!("Session label is required"))
        } else {
            self.fetch_freesurfer(project, session)
        };

        result.unwrap_or_else(|err| {
            warn!("Error accessing XNAT: {err:#}");
            false
        })
    }
}
