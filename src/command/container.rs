//! Docker container wrapping.
//!
//! Docker is the only supported container runtime. Wrapping is triggered
//! when `DockerRequirement` appears among the requirements, or among the
//! hints when a `docker` binary was detected on the host. File and
//! Directory inputs are bind-mounted read-only under
//! `<vardir>/lib/cwl/inputs/` and their paths rewritten to the container
//! side for all subsequent rendering.

use crate::error::{CwlError, Result};
use crate::runtime::{HostConfig, RuntimeEnv};
use crate::schema::{ProcessCommon, Requirement};
use crate::value::CwlValue;
use indexmap::IndexMap;
use std::path::PathBuf;

/// The resolved container invocation parameters.
#[derive(Debug, Clone)]
pub struct DockerSpec {
    pub image: String,
    pub output_directory: Option<String>,
}

impl DockerSpec {
    /// The container working directory: `dockerOutputDirectory` when
    /// declared, else `<vardir>/spool/cwl`.
    pub fn workdir(&self, host: &HostConfig) -> String {
        match &self.output_directory {
            Some(dir) => dir.clone(),
            None => format!("{}/spool/cwl", host.platform.vardir()),
        }
    }
}

/// Decide whether the process runs under Docker.
pub fn docker_spec(common: &ProcessCommon, host: &HostConfig) -> Result<Option<DockerSpec>> {
    let (requirement, is_hint) = match common.find_requirement("DockerRequirement") {
        Some(found) => found,
        None => return Ok(None),
    };
    if is_hint && !host.docker_available {
        return Ok(None);
    }
    match requirement {
        Requirement::Docker {
            docker_pull,
            docker_image_id,
            docker_output_directory,
            ..
        } => {
            let image = docker_pull
                .clone()
                .or_else(|| docker_image_id.clone())
                .ok_or_else(|| {
                    CwlError::inspection_error(
                        "DockerRequirement without dockerPull or dockerImageId",
                    )
                })?;
            Ok(Some(DockerSpec {
                image,
                output_directory: docker_output_directory.clone(),
            }))
        }
        _ => Ok(None),
    }
}

/// A bind mount from host to container.
#[derive(Debug, Clone, PartialEq)]
pub struct Mount {
    pub host_path: String,
    pub container_path: String,
}

/// Rewrite File/Directory input paths to their container-side locations,
/// collecting the read-only mounts the command vector needs.
pub fn rewrite_inputs(
    inputs: &IndexMap<String, CwlValue>,
    host: &HostConfig,
) -> (IndexMap<String, CwlValue>, Vec<Mount>) {
    let inputs_dir = format!("{}/lib/cwl/inputs", host.platform.vardir());
    let mut mounts = Vec::new();
    let mut rewritten = IndexMap::new();
    for (name, value) in inputs {
        rewritten.insert(name.clone(), rewrite_value(value, &inputs_dir, &mut mounts));
    }
    (rewritten, mounts)
}

fn rewrite_value(value: &CwlValue, inputs_dir: &str, mounts: &mut Vec<Mount>) -> CwlValue {
    match value {
        CwlValue::File { file, cwl_type } => {
            let mut file = file.clone();
            if let Some(host_path) = file.path_or_location() {
                let basename = file.basename.clone().unwrap_or_else(|| {
                    PathBuf::from(&host_path)
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default()
                });
                let container_path = format!("{}/{}", inputs_dir, basename);
                mounts.push(Mount {
                    host_path,
                    container_path: container_path.clone(),
                });
                file.path = Some(container_path.clone());
                file.location = Some(container_path);
            }
            file.secondary_files = file
                .secondary_files
                .iter()
                .map(|sf| rewrite_value(sf, inputs_dir, mounts))
                .collect();
            CwlValue::File {
                file,
                cwl_type: cwl_type.clone(),
            }
        }
        CwlValue::Directory { dir, cwl_type } => {
            let mut dir = dir.clone();
            if let Some(host_path) = dir.path_or_location() {
                let basename = dir.basename.clone().unwrap_or_else(|| {
                    PathBuf::from(&host_path)
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default()
                });
                let container_path = format!("{}/{}", inputs_dir, basename);
                mounts.push(Mount {
                    host_path,
                    container_path: container_path.clone(),
                });
                dir.path = Some(container_path.clone());
                dir.location = Some(container_path);
            }
            CwlValue::Directory {
                dir,
                cwl_type: cwl_type.clone(),
            }
        }
        CwlValue::Array { values, cwl_type } => CwlValue::Array {
            values: values
                .iter()
                .map(|v| rewrite_value(v, inputs_dir, mounts))
                .collect(),
            cwl_type: cwl_type.clone(),
        },
        CwlValue::Record { members, cwl_type } => CwlValue::Record {
            members: members
                .iter()
                .map(|(k, v)| (k.clone(), rewrite_value(v, inputs_dir, mounts)))
                .collect(),
            cwl_type: cwl_type.clone(),
        },
        other => other.clone(),
    }
}

/// The `docker run …` tokens up to and including the image, with the fixed
/// flag set, working directory, user mapping, volumes, and environment.
pub fn docker_tokens(
    spec: &DockerSpec,
    host: &HostConfig,
    runtime: &RuntimeEnv,
    mounts: &[Mount],
    env_vars: &[(String, String)],
) -> Vec<String> {
    let workdir = spec.workdir(host);
    let mut tokens = vec![
        "docker".to_string(),
        "run".to_string(),
        "-i".to_string(),
        "--read-only".to_string(),
        "--rm".to_string(),
        format!("--workdir={}", workdir),
        format!("--env=HOME={}", workdir),
        "--env=TMPDIR=/tmp".to_string(),
        format!("--user={}:{}", host.uid, host.gid),
        "-v".to_string(),
        format!("{}:{}", runtime.outdir.to_string_lossy(), workdir),
        "-v".to_string(),
        format!("{}:/tmp", runtime.tmpdir.to_string_lossy()),
    ];
    for mount in mounts {
        tokens.push("-v".to_string());
        tokens.push(format!("{}:{}:ro", mount.host_path, mount.container_path));
    }
    for (name, value) in env_vars {
        tokens.push(format!("--env={}='{}'", name, value.replace('\'', "'\\''")));
    }
    tokens.push(spec.image.clone());
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Platform;
    use crate::types::CwlType;
    use crate::value::FileValue;
    use serde_json::Value as JsonValue;

    fn host(docker: bool) -> HostConfig {
        HostConfig {
            platform: Platform::Linux,
            uid: 1000,
            gid: 1000,
            nprocs: 4,
            docker_available: docker,
        }
    }

    fn common_with(raw: JsonValue, as_hint: bool) -> ProcessCommon {
        let mut ctx = crate::loader::LoadContext::empty();
        let reqs = Requirement::parse_list(&raw, &mut ctx, as_hint).unwrap();
        ProcessCommon {
            id: None,
            label: None,
            doc: None,
            cwl_version: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            requirements: if as_hint { Vec::new() } else { reqs.clone() },
            hints: if as_hint { reqs } else { Vec::new() },
        }
    }

    #[test]
    fn test_requirement_triggers_without_binary() {
        let common = common_with(
            serde_json::json!([{"class": "DockerRequirement", "dockerPull": "debian"}]),
            false,
        );
        let spec = docker_spec(&common, &host(false)).unwrap().unwrap();
        assert_eq!(spec.image, "debian");
    }

    #[test]
    fn test_hint_requires_binary() {
        let common = common_with(
            serde_json::json!([{"class": "DockerRequirement", "dockerPull": "debian"}]),
            true,
        );
        assert!(docker_spec(&common, &host(false)).unwrap().is_none());
        assert!(docker_spec(&common, &host(true)).unwrap().is_some());
    }

    #[test]
    fn test_workdir_default_and_override() {
        let spec = DockerSpec {
            image: "debian".to_string(),
            output_directory: None,
        };
        assert_eq!(spec.workdir(&host(true)), "/var/spool/cwl");

        let spec = DockerSpec {
            image: "debian".to_string(),
            output_directory: Some("/work".to_string()),
        };
        assert_eq!(spec.workdir(&host(true)), "/work");
    }

    #[test]
    fn test_rewrite_collects_mounts() {
        let mut inputs = IndexMap::new();
        inputs.insert(
            "src".to_string(),
            CwlValue::File {
                file: Box::new(FileValue {
                    path: Some("/home/user/Foo.java".to_string()),
                    basename: Some("Foo.java".to_string()),
                    ..Default::default()
                }),
                cwl_type: CwlType::File,
            },
        );
        let (rewritten, mounts) = rewrite_inputs(&inputs, &host(true));
        assert_eq!(
            mounts,
            vec![Mount {
                host_path: "/home/user/Foo.java".to_string(),
                container_path: "/var/lib/cwl/inputs/Foo.java".to_string(),
            }]
        );
        match &rewritten["src"] {
            CwlValue::File { file, .. } => {
                assert_eq!(file.path.as_deref(), Some("/var/lib/cwl/inputs/Foo.java"))
            }
            other => panic!("expected file, got {:?}", other),
        }
    }

    #[test]
    fn test_docker_tokens_fixed_flags() {
        let spec = DockerSpec {
            image: "docker/whalesay".to_string(),
            output_directory: None,
        };
        let runtime = RuntimeEnv::new("/home/user/work", "/tmp");
        let tokens = docker_tokens(&spec, &host(true), &runtime, &[], &[]);
        assert_eq!(
            tokens.join(" "),
            "docker run -i --read-only --rm --workdir=/var/spool/cwl \
             --env=HOME=/var/spool/cwl --env=TMPDIR=/tmp --user=1000:1000 \
             -v /home/user/work:/var/spool/cwl -v /tmp:/tmp docker/whalesay"
        );
    }
}
