//! The module resolver and emitter: walks a parsed TF module in source
//! order, assigns PCL names, recurses into referenced modules (local, remote,
//! and registry) with deduplication, and writes the translated `.pp` files
//! plus the project manifest.

use crate::body::{
    self, convert_data_resource, convert_local, convert_managed_resource, convert_module_call,
    convert_output, convert_sandboxed_module_call, convert_variable,
};
use crate::diag::{Diagnostic, Diagnostics};
use crate::info::{resolve_required_version, ProviderInfoSource};
use crate::lexer::Sources;
use crate::parser::{
    self, Declaration, ModuleCall, ModuleSource, RegistrySource, RequiredProvider,
};
use crate::pcl;
use crate::project::{Project, PROJECT_FILENAME};
use crate::pulumiverse::{is_terraform_provider, renamed_provider};
use crate::scopes::{camel_case_name, pascal_case_name, PathInfo, Scopes};
use crate::state::ConvertState;
use crate::version::{Constraints, Version};
use crate::{clean_path, Vfs};
use anyhow::{bail, Result};
use base64::{engine::general_purpose, Engine as _};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Annotation in a leading comment that marks a module call to be rendered
/// as an opaque module-runner resource instead of being inlined.
const MODULE_ANNOTATION: &str = "@module";

const TERRAFORM_PROVIDER_BASE_VERSION: &str = "0.8.1";
const TERRAFORM_MODULE_BASE_VERSION: &str = "0.1.4";
// Aligned with the module runner's version for local modules.
const LOCAL_MODULE_PACKAGE_VERSION: &str = "0.0.1";

/// Materializes remote module packages into local directories.
pub trait PackageFetcher: Sync {
    fn fetch_package(&self, addr: &str) -> Result<PathBuf>;
}

/// Lists and locates modules in a module registry.
pub trait RegistryClient: Sync {
    fn module_versions(&self, source: &RegistrySource) -> Result<Vec<Version>>;
    fn module_location(&self, source: &RegistrySource, version: &Version) -> Result<String>;
}

/// External collaborators for module resolution.
#[derive(Clone, Copy)]
pub struct Externals<'a> {
    pub fetcher: &'a dyn PackageFetcher,
    pub registry: &'a dyn RegistryClient,
}

struct UnconfiguredFetcher;

impl PackageFetcher for UnconfiguredFetcher {
    fn fetch_package(&self, addr: &str) -> Result<PathBuf> {
        bail!("no package fetcher configured, cannot download {addr}")
    }
}

struct UnconfiguredRegistry;

impl RegistryClient for UnconfiguredRegistry {
    fn module_versions(&self, source: &RegistrySource) -> Result<Vec<Version>> {
        bail!("no module registry client configured, cannot resolve {source}")
    }

    fn module_location(&self, source: &RegistrySource, _version: &Version) -> Result<String> {
        bail!("no module registry client configured, cannot resolve {source}")
    }
}

/// A module call flagged to stay opaque.
struct SandboxedModule {
    package_name: String,
    call: ModuleCall,
    local: bool,
    absolute_path: PathBuf,
}

/// Translate the TF module at `source_dir` into `destination`, writing one
/// `.pp` file per source file plus a project manifest when provider
/// configuration is present. Remote and registry module references fail with
/// error diagnostics; use [`translate_module_with`] to supply fetchers.
pub fn translate_module(
    source: &dyn Vfs,
    source_dir: &Path,
    destination: &dyn Vfs,
    info: &dyn ProviderInfoSource,
    generated_project_dir: &Path,
) -> Diagnostics {
    translate_module_with(
        source,
        source_dir,
        destination,
        info,
        generated_project_dir,
        Externals {
            fetcher: &UnconfiguredFetcher,
            registry: &UnconfiguredRegistry,
        },
    )
}

pub fn translate_module_with(
    source: &dyn Vfs,
    source_dir: &Path,
    destination: &dyn Vfs,
    info: &dyn ProviderInfoSource,
    generated_project_dir: &Path,
    externals: Externals<'_>,
) -> Diagnostics {
    let mut translation = Translation {
        info,
        externals,
        dest: destination,
        generated_project_dir: generated_project_dir.to_path_buf(),
        modules: HashMap::new(),
        required_providers: BTreeMap::new(),
        sandboxed: BTreeMap::new(),
    };
    translation.translate_dir(source, source_dir, Path::new("/"), true)
}

struct Translation<'a> {
    info: &'a dyn ProviderInfoSource,
    externals: Externals<'a>,
    dest: &'a dyn Vfs,
    generated_project_dir: PathBuf,

    /// `(source address, version)` to translated destination path. Local
    /// modules are also memoized under their normalized absolute address so
    /// two relative spellings share one output.
    modules: HashMap<(String, String), PathBuf>,

    required_providers: BTreeMap<String, RequiredProvider>,
    sandboxed: BTreeMap<String, SandboxedModule>,
}

impl Translation<'_> {
    fn translate_dir(
        &mut self,
        source: &dyn Vfs,
        source_dir: &Path,
        dest_dir: &Path,
        top_level: bool,
    ) -> Diagnostics {
        let mut sources = Sources::new();
        let mut diags = Diagnostics::new();
        let module = match parser::load_module(source, source_dir, &mut sources, &mut diags) {
            Ok(module) => module,
            Err(err) => {
                if !diags.has_errors() {
                    diags.push(Diagnostic::error(
                        "Failed to load module",
                        format!("{}: {err}", source_dir.display()),
                    ));
                }
                return diags;
            }
        };

        for (name, provider) in &module.required_providers {
            self.required_providers.insert(name.clone(), provider.clone());
        }

        let mut scopes = Scopes::new();
        let mut state = ConvertState::new(sources);
        state.diagnostics = diags;

        // Gather every declaration, screening names against PCL keywords,
        // then order by source position.
        let mut items: Vec<Declaration> = Vec::new();
        for mut variable in module.variables {
            let range = variable.decl_range.clone();
            let (_, name) = state.rename_pcl_overlap("variable", None, &variable.name, &range);
            variable.name = name;
            items.push(Declaration::Variable(variable));
        }
        for mut local in module.locals {
            let range = local.decl_range.clone();
            let (_, name) = state.rename_pcl_overlap("local", None, &local.name, &range);
            local.name = name;
            items.push(Declaration::Local(local));
        }
        for mut data in module.data_resources {
            let range = data.decl_range.clone();
            let (new_type, name) =
                state.rename_pcl_overlap("data", Some(&data.type_), &data.name, &range);
            if let Some(new_type) = new_type {
                data.type_ = new_type;
            }
            data.name = name;
            items.push(Declaration::Data(data));
        }
        for mut call in module.module_calls {
            let range = call.decl_range.clone();
            let (_, name) = state.rename_pcl_overlap("moduleCall", None, &call.name, &range);
            call.name = name;
            items.push(Declaration::ModuleCall(call));
        }
        for mut resource in module.managed_resources {
            let range = resource.decl_range.clone();
            let (new_type, name) =
                state.rename_pcl_overlap("resource", Some(&resource.type_), &resource.name, &range);
            if let Some(new_type) = new_type {
                resource.type_ = new_type;
            }
            resource.name = name;
            items.push(Declaration::Resource(resource));
        }
        for mut output in module.outputs {
            let range = output.decl_range.clone();
            let (_, name) = state.rename_pcl_overlap("output", None, &output.name, &range);
            output.name = name;
            items.push(Declaration::Output(output));
        }
        for mut provider in module.provider_configs {
            let range = provider.decl_range.clone();
            let (_, name) = state.rename_pcl_overlap("provider", None, &provider.name, &range);
            provider.name = name;
            items.push(Declaration::Provider(provider));
        }
        items.sort_by(|a, b| {
            let ra = a.decl_range();
            let rb = b.decl_range();
            (&ra.filename, ra.start.line, ra.start.column).cmp(&(
                &rb.filename,
                rb.start.line,
                rb.start.column,
            ))
        });

        // The naming pre-pass: later expression translation sees a complete
        // symbol table.
        for item in &items {
            if let Declaration::Variable(variable) = item {
                scopes.get_or_add_name(&format!("var.{}", variable.name), "", "Config");
            }
        }
        for item in &items {
            if let Declaration::Local(local) = item {
                let key = format!("local.{}", local.name);
                scopes.get_or_add_name(&key, "my", "");
                if let Some(root) = scopes.root(&key) {
                    let mut root = root.clone();
                    root.expression = Some(local.expr.clone());
                    scopes.set_root(key, root);
                }
            }
        }
        for item in &items {
            if let Declaration::Data(data) = item {
                let key = format!("data.{}.{}", data.type_, data.name);
                let provider = body::implied_provider(&data.type_).to_string();
                let mut root = PathInfo::default();
                // Uses of the deprecated template provider are rewritten, so
                // skip the mapping lookup for it.
                if provider != "template" {
                    match self
                        .info
                        .get_provider_info(&provider, self.required_providers.get(&provider))
                    {
                        Ok(info) => {
                            if let Some(data_source) = info.data_sources.get(&data.type_) {
                                root.resource = Some(Rc::new(data_source.clone()));
                            }
                        }
                        Err(err) => state.push_diagnostic(
                            Diagnostic::warning(
                                "Failed to get provider info",
                                format!("Failed to get provider info for {:?}: {err:#}", data.type_),
                            )
                            .with_subject(&data.decl_range),
                        ),
                    }
                }
                let token = root
                    .resource
                    .as_ref()
                    .map(|r| r.tok.clone())
                    .filter(|tok| !tok.is_empty())
                    .unwrap_or_else(|| body::implied_token(&data.type_));
                let suffix = pascal_case_name(token.rsplit(':').next().unwrap_or(&token));
                root.name = scopes.get_or_add_name(&key, "", &suffix);
                scopes.set_root(key, root);
            }
        }
        for item in &items {
            if let Declaration::Resource(resource) = item {
                let key = format!("{}.{}", resource.type_, resource.name);
                let provider = body::implied_provider(&resource.type_).to_string();
                let mut root = PathInfo::default();
                match self
                    .info
                    .get_provider_info(&provider, self.required_providers.get(&provider))
                {
                    Ok(info) => {
                        if let Some(resource_info) = info.resources.get(&resource.type_) {
                            root.resource = Some(Rc::new(resource_info.clone()));
                        }
                    }
                    Err(err) => state.push_diagnostic(
                        Diagnostic::warning(
                            "Failed to get provider info",
                            format!(
                                "Failed to get provider info for {:?}: {err:#}",
                                resource.type_
                            ),
                        )
                        .with_subject(&resource.decl_range),
                    ),
                }
                let token = root
                    .resource
                    .as_ref()
                    .map(|r| r.tok.clone())
                    .filter(|tok| !tok.is_empty())
                    .unwrap_or_else(|| body::implied_token(&resource.type_));
                let suffix = pascal_case_name(token.rsplit(':').next().unwrap_or(&token));
                root.name = scopes.get_or_add_name(&key, "", &suffix);
                scopes.set_root(key, root);
            }
        }

        // Module calls: name them, detect sandboxing, and resolve/translate
        // referenced modules with deduplication by (source, version).
        for item in &items {
            let Declaration::ModuleCall(call) = item else {
                continue;
            };
            let (leading, _) = state.sources.trivia_around(&call.decl_range, false);
            let leading_text: String = leading.iter().map(|t| t.text.as_str()).collect();
            let mut sandbox_package = find_module_annotation(&leading_text);
            let module_name =
                scopes.get_or_add_name(&format!("module.{}", call.name), "", "Component");
            let module_key = (call.source_str.clone(), call.version_str.clone());

            // Other calls to the same source may already be sandboxed; this
            // one then is too.
            if sandbox_package.is_none() {
                for sandboxed in self.sandboxed.values() {
                    if sandboxed.call.source_str == call.source_str {
                        sandbox_package = Some(sandboxed.package_name.clone());
                        break;
                    }
                }
            }

            if let Some(package_name) = &sandbox_package {
                match &call.source {
                    ModuleSource::Registry(registry) => {
                        let key =
                            format!("{}-{}-{}", call.name, registry.namespace, registry.name);
                        if !self.sandboxed.contains_key(&key) {
                            state
                                .sandboxed_module_names
                                .insert(call.name.clone(), module_name.clone());
                            self.sandboxed.insert(
                                key,
                                SandboxedModule {
                                    package_name: package_name.clone(),
                                    call: call.clone(),
                                    local: false,
                                    absolute_path: PathBuf::new(),
                                },
                            );
                        }
                    }
                    ModuleSource::Local(local) => {
                        let absolute = clean_path(&source_dir.join(local));
                        let key = absolute.to_string_lossy().into_owned();
                        if !self.sandboxed.contains_key(&key) {
                            state
                                .sandboxed_module_names
                                .insert(call.name.clone(), module_name.clone());
                            self.sandboxed.insert(
                                key,
                                SandboxedModule {
                                    package_name: package_name.clone(),
                                    call: call.clone(),
                                    local: true,
                                    absolute_path: absolute,
                                },
                            );
                        }
                    }
                    ModuleSource::Remote { .. } => {}
                }
            }

            if self.modules.contains_key(&module_key) || sandbox_package.is_some() {
                continue;
            }

            match &call.source {
                ModuleSource::Local(addr) => {
                    // Multiple relative spellings of the same directory share
                    // one translated output, keyed by the absolute address.
                    let absolute = clean_path(&source_dir.join(addr));
                    let absolute_key = (
                        absolute.to_string_lossy().into_owned(),
                        call.version_str.clone(),
                    );
                    if let Some(existing) = self.modules.get(&absolute_key) {
                        let existing = existing.clone();
                        self.modules.insert(module_key, existing);
                        continue;
                    }

                    let source_path = clean_path(&source_dir.join(addr));
                    let destination_path = clean_path(&dest_dir.join(addr));
                    if self.modules.values().any(|p| p == &destination_path) {
                        state.push_diagnostic(
                            Diagnostic::error(
                                "Duplicate module path",
                                format!(
                                    "The module path {:?} is already taken by another module",
                                    destination_path.display()
                                ),
                            )
                            .with_subject(&call.decl_range),
                        );
                        return state.diagnostics;
                    }
                    self.modules.insert(module_key, destination_path.clone());
                    self.modules.insert(absolute_key, destination_path.clone());

                    let sub_diags =
                        self.translate_dir(source, &source_path, &destination_path, false);
                    let has_errors = sub_diags.has_errors();
                    state.diagnostics.extend(sub_diags);
                    if has_errors {
                        return state.diagnostics;
                    }
                }
                ModuleSource::Remote { package, subdir } => {
                    let module_base = remote_module_basename(package, subdir);
                    let destination_path = clean_path(&dest_dir.join(module_base));
                    if self.modules.values().any(|p| p == &destination_path) {
                        state.push_diagnostic(
                            Diagnostic::error(
                                "Duplicate module path",
                                format!(
                                    "The module path {:?} is already taken by another module",
                                    destination_path.display()
                                ),
                            )
                            .with_subject(&call.decl_range),
                        );
                        return state.diagnostics;
                    }
                    self.modules.insert(module_key, destination_path.clone());

                    let sub_diags =
                        self.translate_remote(package, subdir, &destination_path);
                    let has_errors = sub_diags.has_errors();
                    state.diagnostics.extend(sub_diags);
                    if has_errors {
                        return state.diagnostics;
                    }
                }
                ModuleSource::Registry(registry) => {
                    let resolved = match self.resolve_registry_module(registry, &call.version) {
                        Ok(resolved) => resolved,
                        Err(err) => {
                            state.push_diagnostic(
                                Diagnostic::error(
                                    "Error accessing remote module registry",
                                    format!("{err:#}"),
                                )
                                .with_subject(&call.decl_range),
                            );
                            return state.diagnostics;
                        }
                    };
                    let (remote_package, version) = resolved;

                    // Re-key by the concrete version so distinct constraints
                    // resolving to the same release share one output.
                    let absolute_key = (call.source_str.clone(), version.to_string());
                    if let Some(existing) = self.modules.get(&absolute_key) {
                        let existing = existing.clone();
                        self.modules.insert(module_key, existing);
                        continue;
                    }

                    let destination_path = clean_path(
                        &dest_dir
                            .join(format!("{}_{}", registry.name, version))
                            .join(&registry.subdir),
                    );
                    if self.modules.values().any(|p| p == &destination_path) {
                        state.push_diagnostic(
                            Diagnostic::error(
                                "Duplicate module path",
                                format!(
                                    "The module path {:?} is already taken by another module",
                                    destination_path.display()
                                ),
                            )
                            .with_subject(&call.decl_range),
                        );
                        return state.diagnostics;
                    }
                    self.modules.insert(module_key, destination_path.clone());
                    self.modules.insert(absolute_key, destination_path.clone());

                    let sub_diags = self.translate_remote(
                        &remote_package,
                        &registry.subdir,
                        &destination_path,
                    );
                    let has_errors = sub_diags.has_errors();
                    state.diagnostics.extend(sub_diags);
                    if has_errors {
                        return state.diagnostics;
                    }
                }
            }
        }

        for item in &items {
            if let Declaration::Output(output) = item {
                scopes.get_or_add_output(&format!("output.{}", output.name));
            }
        }

        // Provider configurations accumulate into the project manifest.
        let mut project: Option<Project> = None;
        for item in &items {
            let Declaration::Provider(provider) = item else {
                continue;
            };
            let cfg_name = renamed_provider(&provider.name)
                .unwrap_or(&provider.name)
                .to_string();

            if let Some(alias) = &provider.alias {
                state.push_diagnostic(
                    Diagnostic::warning(
                        "Provider alias not supported",
                        format!(
                            "Provider aliases are not supported, ignoring {}={}",
                            provider.name, alias
                        ),
                    )
                    .with_subject(&provider.decl_range),
                );
                continue;
            }

            if project.is_none() {
                let project_name = source_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "project".to_string());
                project = Some(Project::new(project_name));
            }

            let provider_info = match self
                .info
                .get_provider_info(&provider.name, self.required_providers.get(&provider.name))
            {
                Ok(info) => Some(info),
                Err(err) => {
                    state.push_diagnostic(
                        Diagnostic::warning(
                            "Failed to get provider info",
                            format!(
                                "Failed to get provider info for {:?}: {err:#}",
                                provider.name
                            ),
                        )
                        .with_subject(&provider.decl_range),
                    );
                    None
                }
            };

            for block in provider.config.blocks() {
                state.push_diagnostic(
                    Diagnostic::warning(
                        "Provider config not supported",
                        format!(
                            "Blocks in provider config are not supported, ignoring {}:{}",
                            provider.name, block.kind
                        ),
                    )
                    .with_subject(&block.def_range),
                );
            }

            // Attributes in source order for stable output.
            let mut attrs: Vec<&parser::ConfigAttr> = provider.config.attrs().collect();
            attrs.sort_by_key(|a| a.range.start.line);
            for attr in attrs {
                // Provider config values must be pure expressions; anything
                // else degrades to an explicit TODO.
                let value = match body::eval_config_value(&scopes, &attr.expr) {
                    Ok(value) => value,
                    Err(_) => {
                        state.push_diagnostic(
                            Diagnostic::warning(
                                "Failed to evaluate provider config",
                                format!(
                                    "Could not evaluate expression for {}:{}",
                                    cfg_name, attr.name
                                ),
                            )
                            .with_subject(&provider.decl_range),
                        );
                        hcl::Value::String(format!(
                            "TODO: {}",
                            state.source_code(&attr.expr_range)
                        ))
                    }
                };
                // The JSON round trip produces YAML-friendly structures.
                let json_value = match serde_json::to_value(&value) {
                    Ok(json_value) => json_value,
                    Err(err) => {
                        state.push_diagnostic(
                            Diagnostic::error(
                                "Failed to marshal provider config",
                                format!(
                                    "Could not marshal value for {}:{}: {err}",
                                    provider.name, attr.name
                                ),
                            )
                            .with_subject(&provider.decl_range),
                        );
                        continue;
                    }
                };

                let mut config_key = camel_case_name(&attr.name);
                if let Some(info) = &provider_info {
                    if let Some(schema) = info.config.get(&attr.name) {
                        if let Some(renamed) = &schema.name {
                            if !renamed.is_empty() {
                                config_key = renamed.clone();
                            }
                        }
                    }
                }
                project
                    .as_mut()
                    .unwrap()
                    .set_config(format!("{cfg_name}:{config_key}"), json_value);
            }
        }

        // Emit matching .pp files in source order; package blocks go at the
        // top of the first file of the top-level module only.
        let mut files: BTreeMap<PathBuf, pcl::File> = BTreeMap::new();
        let mut package_blocks_pending = top_level;
        for item in &items {
            let range = item.decl_range();
            let relative = relative_path(source_dir, Path::new(&range.filename));
            let out_name = change_extension(&relative, "pp");
            let file = files.entry(out_name).or_insert_with(pcl::File::new);

            if package_blocks_pending {
                self.append_package_blocks(file, &mut state);
                package_blocks_pending = false;
            }

            match item {
                Declaration::Variable(variable) => {
                    let (leading, block, trailing) =
                        convert_variable(&mut state, &mut scopes, variable);
                    file.push_trivia(leading);
                    file.items.push(pcl::Item::Block(block));
                    file.push_trivia(trailing);
                }
                Declaration::Local(local) => {
                    let (leading, name, value) = convert_local(&mut state, &mut scopes, local);
                    file.push_trivia(leading);
                    file.items
                        .push(pcl::Item::Attribute(pcl::Attribute::new(name, value)));
                }
                Declaration::Data(data) => {
                    let (leading, name, value) =
                        convert_data_resource(&mut state, &mut scopes, data);
                    file.push_trivia(leading);
                    file.items
                        .push(pcl::Item::Attribute(pcl::Attribute::new(name, value)));
                }
                Declaration::Resource(resource) => {
                    let items = convert_managed_resource(&mut state, &mut scopes, resource);
                    file.items.extend(items);
                }
                Declaration::ModuleCall(call) => {
                    if let Some(sandboxed) = self.find_sandboxed(call, source_dir) {
                        let package_name = sandboxed.package_name.clone();
                        // The leading trivia holds the annotation comment and
                        // is intentionally dropped.
                        let (_, block, trailing) = convert_sandboxed_module_call(
                            &mut state,
                            &mut scopes,
                            call,
                            &package_name,
                        );
                        file.items.push(pcl::Item::Block(block));
                        file.push_trivia(trailing);
                    } else {
                        let module_key = (call.source_str.clone(), call.version_str.clone());
                        let module_path = self
                            .modules
                            .get(&module_key)
                            .unwrap_or_else(|| panic!("module {} not found", call.source_str));
                        let component_path = component_path(dest_dir, module_path);
                        let (leading, block, trailing) = convert_module_call(
                            &mut state,
                            &mut scopes,
                            call,
                            &component_path,
                        );
                        file.push_trivia(leading);
                        file.items.push(pcl::Item::Block(block));
                        file.push_trivia(trailing);
                    }
                }
                Declaration::Output(output) => {
                    let (leading, block, trailing) =
                        convert_output(&mut state, &mut scopes, output);
                    file.push_trivia(leading);
                    file.items.push(pcl::Item::Block(block));
                    file.push_trivia(trailing);
                }
                Declaration::Provider(_) => {}
            }
        }

        // Always create the destination directory, even with nothing to
        // write.
        if let Err(err) = self.dest.create_dir_all(dest_dir) {
            state.push_diagnostic(Diagnostic::error(
                "Could not create destination directory",
                err.to_string(),
            ));
            return state.diagnostics;
        }
        for (relative, file) in &files {
            let rendered = pcl::render(file);
            let full_path = dest_dir.join(relative);
            if let Err(err) = self.dest.write(&full_path, rendered.as_bytes()) {
                state.push_diagnostic(Diagnostic::error(
                    "Could not write translated file",
                    format!("{}: {err}", full_path.display()),
                ));
                return state.diagnostics;
            }
        }

        if let Some(project) = project {
            match project.to_yaml() {
                Ok(yaml) => {
                    let full_path = dest_dir.join(PROJECT_FILENAME);
                    if let Err(err) = self.dest.write(&full_path, yaml.as_bytes()) {
                        state.push_diagnostic(Diagnostic::error(
                            "Could not write project file",
                            format!("{}: {err}", full_path.display()),
                        ));
                    }
                }
                Err(err) => state.push_diagnostic(Diagnostic::error(
                    "Could not format project file",
                    err.to_string(),
                )),
            }
        }

        state.diagnostics
    }

    /// Fetch a remote package and translate its module directory.
    fn translate_remote(&mut self, package: &str, subdir: &str, dest_dir: &Path) -> Diagnostics {
        let fetched = match self.externals.fetcher.fetch_package(package) {
            Ok(path) => path,
            Err(err) => {
                let mut diags = Diagnostics::new();
                diags.push(Diagnostic::error(
                    "Failed to download module",
                    format!("Failed to download module: {err:#}"),
                ));
                return diags;
            }
        };
        let module_dir = if subdir.is_empty() {
            fetched
        } else {
            fetched.join(subdir)
        };
        let remote_fs = crate::OsFs::new(module_dir);
        self.translate_dir(&remote_fs, Path::new("/"), dest_dir, false)
    }

    /// Resolve a registry source to a concrete remote package address and
    /// version: the highest non-prerelease release satisfying the constraint.
    fn resolve_registry_module(
        &self,
        source: &RegistrySource,
        constraints: &Constraints,
    ) -> Result<(String, Version)> {
        let versions = self
            .externals
            .registry
            .module_versions(source)
            .map_err(|err| anyhow::anyhow!("failed to retrieve available versions for {source}: {err}"))?;

        let latest = versions
            .iter()
            .filter(|v| !v.is_prerelease() && constraints.check(v))
            .max()
            .cloned();
        let Some(latest) = latest else {
            bail!("failed to find version for {source} that matched the requirement");
        };

        let location = self
            .externals
            .registry
            .module_location(source, &latest)
            .map_err(|err| {
                anyhow::anyhow!("failed to retrieve a download URL for {source} {latest}: {err}")
            })?;

        // A registry must hand back a direct remote package address; local
        // paths and further registry indirection are not allowed.
        match parser::parse_module_source(&location) {
            ModuleSource::Remote { package, .. } => Ok((package, latest)),
            _ => bail!(
                "module registry returned invalid source location {location:?} for {source} \
                 {latest}: must be a direct remote package address"
            ),
        }
    }

    fn find_sandboxed(&self, call: &ModuleCall, source_dir: &Path) -> Option<&SandboxedModule> {
        match &call.source {
            ModuleSource::Registry(registry) => {
                let key = format!("{}-{}-{}", call.name, registry.namespace, registry.name);
                self.sandboxed.get(&key)
            }
            ModuleSource::Local(local) => {
                let key = clean_path(&source_dir.join(local))
                    .to_string_lossy()
                    .into_owned();
                self.sandboxed.get(&key)
            }
            ModuleSource::Remote { .. } => None,
        }
    }

    /// One `package` block per required provider (lexicographic), then one
    /// per distinct sandboxed-module package.
    fn append_package_blocks(&self, file: &mut pcl::File, state: &mut ConvertState) {
        for provider in self.required_providers.values() {
            let (block, diags) = package_block(provider);
            state.diagnostics.extend(diags);
            file.items.push(pcl::Item::Block(block));
            file.push_trivia(vec![pcl::newline()]);
        }

        let mut declared: BTreeSet<String> = BTreeSet::new();
        for sandboxed in self.sandboxed.values() {
            if !declared.insert(sandboxed.package_name.clone()) {
                continue;
            }
            if sandboxed.local {
                let relative =
                    relative_path(&self.generated_project_dir, &sandboxed.absolute_path);
                let block = local_module_package_block(
                    &sandboxed.package_name,
                    &to_slash(&relative),
                );
                file.items.push(pcl::Item::Block(block));
                file.push_trivia(vec![pcl::newline()]);
            } else {
                let ModuleSource::Registry(registry) = &sandboxed.call.source else {
                    continue;
                };
                match self.resolve_registry_module(registry, &sandboxed.call.version) {
                    Ok((_, version)) => {
                        let block = remote_module_package_block(
                            &sandboxed.package_name,
                            registry,
                            &version.to_string(),
                        );
                        file.items.push(pcl::Item::Block(block));
                        file.push_trivia(vec![pcl::newline()]);
                    }
                    Err(err) => state.push_diagnostic(
                        Diagnostic::error(
                            "Error accessing remote module registry",
                            format!("resolving remote module: {err:#}"),
                        )
                        .with_subject(&sandboxed.call.decl_range),
                    ),
                }
            }
        }
    }
}

/// The `package` block describing how to load a required provider: known
/// packages carry just their base provider name; everything else is the
/// dynamically bridged `terraform-provider` with a parameterization.
fn package_block(provider: &RequiredProvider) -> (pcl::Block, Diagnostics) {
    let mut diags = Diagnostics::new();

    let package_name = provider
        .source
        .rsplit('/')
        .next()
        .unwrap_or(provider.source.as_str());
    let package_name = renamed_provider(package_name).unwrap_or(package_name);

    let mut block = pcl::Block::new("package", vec![package_name.to_string()]);
    if is_terraform_provider(package_name) {
        block.set_attribute(
            "baseProviderName",
            vec![pcl::quoted("terraform-provider")],
        );
        block.set_attribute(
            "baseProviderVersion",
            vec![pcl::quoted(TERRAFORM_PROVIDER_BASE_VERSION)],
        );

        let version = resolve_required_version(provider).unwrap_or_else(|| {
            diags.push(Diagnostic::warning(
                "Failed to resolve provider version",
                format!(
                    "Could not resolve a concrete version for provider {} ({:?})",
                    provider.name, provider.version
                ),
            ));
            Version::new(0, 0, 0)
        });
        let inner_value = format!(
            "{{\"remote\":{{\"url\":\"{}\",\"version\":\"{}\"}}}}",
            provider.source, version
        );
        let encoded = general_purpose::STANDARD.encode(inner_value.as_bytes());

        let mut parameterization = pcl::Block::new("parameterization", Vec::new());
        parameterization.set_attribute("version", vec![pcl::quoted(&version.to_string())]);
        parameterization.set_attribute("name", vec![pcl::quoted(package_name)]);
        parameterization.set_attribute("value", vec![pcl::quoted(&encoded)]);
        block.items.push(pcl::Item::Block(parameterization));
    } else {
        block.set_attribute("baseProviderName", vec![pcl::quoted(package_name)]);
    }

    (block, diags)
}

fn module_parameterization_comments(lines: &[String]) -> pcl::Item {
    let mut tokens = Vec::new();
    tokens.push(pcl::tok(pcl::TokKind::Comment, "// encoded parameterization values:\n"));
    for line in lines {
        tokens.push(pcl::tok(pcl::TokKind::Comment, format!("// {line}\n")));
    }
    pcl::Item::Trivia(tokens)
}

fn remote_module_package_block(
    package_name: &str,
    source: &RegistrySource,
    version: &str,
) -> pcl::Block {
    let mut block = pcl::Block::new("package", vec![package_name.to_string()]);
    block.set_attribute("baseProviderName", vec![pcl::quoted("terraform-module")]);
    block.set_attribute(
        "baseProviderVersion",
        vec![pcl::quoted(TERRAFORM_MODULE_BASE_VERSION)],
    );

    let mut parameterization = pcl::Block::new("parameterization", Vec::new());
    parameterization.set_attribute("name", vec![pcl::quoted(package_name)]);
    parameterization.set_attribute("version", vec![pcl::quoted(version)]);
    parameterization.items.push(module_parameterization_comments(&[
        format!("module: {source}"),
        format!("version: {version}"),
        format!("packageName: {package_name}"),
    ]));
    let value = serde_json::json!({
        "module": source.to_string(),
        "version": version,
        "packageName": package_name,
    });
    let encoded = general_purpose::STANDARD.encode(value.to_string().as_bytes());
    parameterization.set_attribute("value", vec![pcl::quoted(&encoded)]);
    block.items.push(pcl::Item::Block(parameterization));
    block
}

fn local_module_package_block(package_name: &str, local_path: &str) -> pcl::Block {
    let mut block = pcl::Block::new("package", vec![package_name.to_string()]);
    block.set_attribute("baseProviderName", vec![pcl::quoted("terraform-module")]);
    block.set_attribute(
        "baseProviderVersion",
        vec![pcl::quoted(TERRAFORM_MODULE_BASE_VERSION)],
    );

    let mut parameterization = pcl::Block::new("parameterization", Vec::new());
    parameterization.set_attribute("name", vec![pcl::quoted(package_name)]);
    parameterization.set_attribute(
        "version",
        vec![pcl::quoted(LOCAL_MODULE_PACKAGE_VERSION)],
    );
    parameterization.items.push(module_parameterization_comments(&[
        format!("module: {local_path}"),
        format!("packageName: {package_name}"),
    ]));
    let value = serde_json::json!({
        "module": local_path,
        "packageName": package_name,
    });
    let encoded = general_purpose::STANDARD.encode(value.to_string().as_bytes());
    parameterization.set_attribute("value", vec![pcl::quoted(&encoded)]);
    block.items.push(pcl::Item::Block(parameterization));
    block
}

/// Scan leading trivia for the sandbox annotation followed by a package
/// name.
fn find_module_annotation(trivia: &str) -> Option<String> {
    for line in trivia.lines() {
        let line = line.replace("//", " ").replace(['#', '*'], " ");
        let parts: Vec<&str> = line.split_whitespace().collect();
        for (i, part) in parts.iter().enumerate() {
            if *part == MODULE_ANNOTATION && i + 1 < parts.len() {
                return Some(parts[i + 1].to_string());
            }
        }
    }
    None
}

/// Replace a path's extension.
pub fn change_extension(path: &Path, ext: &str) -> PathBuf {
    path.with_extension(ext)
}

/// The lexical relative path from `base` to `target`.
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base = clean_path(base);
    let target = clean_path(target);
    let base_parts: Vec<_> = base.components().collect();
    let target_parts: Vec<_> = target.components().collect();

    let mut common = 0;
    while common < base_parts.len()
        && common < target_parts.len()
        && base_parts[common] == target_parts[common]
    {
        common += 1;
    }

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &target_parts[common..] {
        out.push(part);
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// A component label: the relative path written unix-style, with an explicit
/// `./` prefix unless it already climbs out.
fn component_path(dest_dir: &Path, module_path: &Path) -> String {
    let relative = to_slash(&relative_path(dest_dir, module_path));
    if relative.starts_with("../") {
        relative
    } else if relative == "." {
        "./".to_string()
    } else {
        format!("./{relative}")
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn remote_module_basename(package: &str, subdir: &str) -> String {
    let candidate = if subdir.is_empty() { package } else { subdir };
    candidate
        .rsplit('/')
        .next()
        .unwrap_or(candidate)
        .to_string()
}
