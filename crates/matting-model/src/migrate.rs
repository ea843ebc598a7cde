//! Lenient weight migration.
//!
//! Every convolution of a [`MattingNet`] has a canonical name (`conv1_1`,
//! `deconv6_1`, `refine_pred`, ...). Parameters are addressed as
//! `<name>.weight` and `<name>.bias`. Migration copies each source entry whose
//! name and shape both match a parameter of the network and leaves everything
//! else untouched, so checkpoints of related architectures (a coarse network,
//! an RGB-only VGG16, ...) can seed a new one.

use std::collections::{BTreeMap, BTreeSet};

use burn::{module::Param, nn::conv::Conv2d, prelude::*, tensor::TensorData};

use crate::models::matting_net::MattingNet;

/// Parameter tensors keyed by `<conv name>.weight` / `<conv name>.bias`.
pub type ParamMap = BTreeMap<String, TensorData>;

/// What [`MattingNet::migrate`] did with every parameter it saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Parameters overwritten from the source.
    pub copied: Vec<String>,
    /// Parameters present in the source with a different shape. Kept as initialized.
    pub mismatched: Vec<String>,
    /// Parameters absent from the source. Kept as initialized.
    pub missing: Vec<String>,
    /// Source entries matching no parameter of the network.
    pub unused: Vec<String>,
}

impl MigrationReport {
    /// `true` when every parameter of the network was copied.
    pub fn is_complete(&self) -> bool {
        self.mismatched.is_empty() && self.missing.is_empty()
    }
}

/// A convolution with its canonical name and its path in the module tree.
#[derive(Debug)]
pub(crate) struct NamedConv<'a, B: Backend> {
    pub name: String,
    pub path: String,
    pub conv: &'a Conv2d<B>,
}

impl<'a, B: Backend> NamedConv<'a, B> {
    pub const fn new(name: String, path: String, conv: &'a Conv2d<B>) -> Self {
        Self { name, path, conv }
    }

    pub fn with_prefix(self, prefix: &str) -> Self {
        Self {
            path: format!("{prefix}.{}", self.path),
            ..self
        }
    }
}

impl<B: Backend> MattingNet<B> {
    /// Canonical names of all parameters, in module order.
    pub fn param_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for named in self.named_convs() {
            names.push(format!("{}.weight", named.name));
            if named.conv.bias.is_some() {
                names.push(format!("{}.bias", named.name));
            }
        }
        names
    }

    /// Snapshot of all parameters under their canonical names.
    pub fn named_params(&self) -> ParamMap {
        let mut params = ParamMap::new();

        for named in self.named_convs() {
            params.insert(
                format!("{}.weight", named.name),
                named.conv.weight.val().into_data(),
            );
            if let Some(bias) = &named.conv.bias {
                params.insert(format!("{}.bias", named.name), bias.val().into_data());
            }
        }

        params
    }

    /// Regex/replacement pairs mapping canonical parameter names to module
    /// paths, for loading foreign checkpoints through key remapping.
    pub fn parameter_key_remaps(&self) -> Vec<(String, String)> {
        self.named_convs()
            .into_iter()
            .map(|named| {
                (
                    format!(r"^{}\.(weight|bias)$", named.name),
                    format!("{}.$1", named.path),
                )
            })
            .collect()
    }

    /// Copies every entry of `source` whose name and shape match a parameter.
    ///
    /// Mismatched and unknown entries are skipped without error. Copied
    /// parameters keep their gradient requirement.
    pub fn migrate(self, source: &ParamMap) -> (Self, MigrationReport) {
        let mut report = MigrationReport::default();
        let mut used = BTreeSet::new();

        let model = self.map_named_convs(&mut |name: &str, mut conv: Conv2d<B>| {
            conv.weight = migrate_param(
                conv.weight,
                format!("{name}.weight"),
                source,
                &mut report,
                &mut used,
            );
            conv.bias = conv.bias.map(|bias| {
                migrate_param(bias, format!("{name}.bias"), source, &mut report, &mut used)
            });
            conv
        });

        report.unused = source
            .keys()
            .filter(|key| !used.contains(*key))
            .cloned()
            .collect();

        tracing::info!(
            copied = report.copied.len(),
            mismatched = report.mismatched.len(),
            missing = report.missing.len(),
            unused = report.unused.len(),
            "Migrated parameters"
        );

        (model, report)
    }
}

fn migrate_param<B: Backend, const D: usize>(
    param: Param<Tensor<B, D>>,
    key: String,
    source: &ParamMap,
    report: &mut MigrationReport,
    used: &mut BTreeSet<String>,
) -> Param<Tensor<B, D>> {
    let Some(data) = source.get(&key) else {
        tracing::debug!(%key, "Parameter missing from source");
        report.missing.push(key);
        return param;
    };
    used.insert(key.clone());

    let expected = param.val().dims();
    if data.shape.as_slice() != expected.as_slice() {
        tracing::debug!(
            %key,
            expected = ?expected,
            actual = ?data.shape,
            "Skipping parameter with mismatched shape"
        );
        report.mismatched.push(key);
        return param;
    }

    tracing::debug!(%key, "Copied parameter");
    report.copied.push(key);
    param.map(|tensor| {
        let require_grad = tensor.is_require_grad();
        let device = tensor.device();
        Tensor::from_data(data.clone().convert::<B::FloatElem>(), &device)
            .set_require_grad(require_grad)
    })
}
