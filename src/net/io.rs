//! I/O 支持：网络描述、标识与状态图摘要的 JSON / RON 序列化。
//!
//! 网络本身带有不可序列化的部分（自定义求值器、谓词类型），
//! 因此持久化经由 [`NetDescription`] 进行：谓词类型退化为 `Any`，
//! 重新载入时使用默认求值器。
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::expr::Expression;
use crate::net::annotation::ArcAnnotation;
use crate::net::core::PetriNet;
use crate::net::error::{NetError, NetResult};
use crate::net::multiset::MultiSet;
use crate::net::place::Place;
use crate::net::transition::Transition;
use crate::net::types::TypeSpec;
use crate::net::value::Value;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron error: {0}")]
    Ron(#[from] ron::Error),
    #[error("ron syntax error: {0}")]
    RonSyntax(#[from] ron::error::SpannedError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid net: {0}")]
    Net(#[from] NetError),
}

/// 文件格式，默认按扩展名判断。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Json,
    Ron,
}

impl Format {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some("ron") => Format::Ron,
            _ => Format::Json,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(Format::Json),
            "ron" => Some(Format::Ron),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceDescription {
    pub name: String,
    #[serde(default)]
    pub tokens: MultiSet<Value>,
    #[serde(default)]
    pub token_type: TypeSpec,
}

fn default_guard() -> Expression {
    Expression::truth()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDescription {
    pub name: String,
    #[serde(default = "default_guard")]
    pub guard: Expression,
    #[serde(default)]
    pub inputs: Vec<(String, ArcAnnotation)>,
    #[serde(default)]
    pub outputs: Vec<(String, ArcAnnotation)>,
}

/// 网络的可序列化描述：库所（令牌与类型）、迁移（守卫与弧）与全局名字。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetDescription {
    pub name: String,
    #[serde(default)]
    pub globals: BTreeMap<String, Value>,
    #[serde(default)]
    pub places: Vec<PlaceDescription>,
    #[serde(default)]
    pub transitions: Vec<TransitionDescription>,
}

impl NetDescription {
    pub fn from_net(net: &PetriNet) -> Self {
        Self {
            name: net.name.clone(),
            globals: net.env().globals().clone(),
            places: net
                .places()
                .map(|place| PlaceDescription {
                    name: place.name.clone(),
                    tokens: place.tokens().clone(),
                    token_type: place.token_type().to_spec().unwrap_or_default(),
                })
                .collect(),
            transitions: net
                .transitions()
                .map(|trans| TransitionDescription {
                    name: trans.name.clone(),
                    guard: trans.guard.clone(),
                    inputs: trans
                        .input()
                        .map(|(place, label)| (place.to_string(), label.clone()))
                        .collect(),
                    outputs: trans
                        .output()
                        .map(|(place, label)| (place.to_string(), label.clone()))
                        .collect(),
                })
                .collect(),
        }
    }

    /// 重建网络；所有弧都经过与手工构造相同的校验。
    pub fn into_net(self) -> NetResult<PetriNet> {
        let mut net = PetriNet::new(self.name);
        for (name, value) in self.globals {
            net.declare(name, value);
        }
        for place in self.places {
            let tokens: Vec<Value> = place.tokens.iter().cloned().collect();
            net.add_place(Place::with_type(place.name, tokens, place.token_type.build())?)?;
        }
        for trans in self.transitions {
            net.add_transition(Transition::with_guard(trans.name.clone(), trans.guard))?;
            for (place, label) in trans.inputs {
                net.add_input(&place, &trans.name, label)?;
            }
            for (place, label) in trans.outputs {
                net.add_output(&place, &trans.name, label)?;
            }
        }
        Ok(net)
    }
}

pub fn to_json_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn from_json_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(serde_json::from_str(s)?)
}

pub fn to_ron_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    let mut pretty = PrettyConfig::default();
    pretty.new_line = "\n".into();
    Ok(ron::ser::to_string_pretty(value, pretty)?)
}

pub fn from_ron_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(ron::from_str(s)?)
}

pub fn to_string<T: Serialize>(value: &T, format: Format) -> Result<String, IoError> {
    match format {
        Format::Json => to_json_string(value),
        Format::Ron => to_ron_string(value),
    }
}

pub fn from_str<T: DeserializeOwned>(s: &str, format: Format) -> Result<T, IoError> {
    match format {
        Format::Json => from_json_str(s),
        Format::Ron => from_ron_str(s),
    }
}

pub fn write_to<P: AsRef<Path>, T: Serialize>(
    path: P,
    value: &T,
    format: Format,
) -> Result<(), IoError> {
    let mut file = File::create(path)?;
    let content = to_string(value, format)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

pub fn read_from<P: AsRef<Path>, T: DeserializeOwned>(
    path: P,
    format: Format,
) -> Result<T, IoError> {
    let mut file = File::open(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    from_str(&content, format)
}

/// 读入网络描述并重建网络，格式按扩展名判断。
pub fn load_net<P: AsRef<Path>>(path: P) -> Result<PetriNet, IoError> {
    let format = Format::from_path(&path);
    let description: NetDescription = read_from(path, format)?;
    Ok(description.into_net()?)
}

pub fn save_net<P: AsRef<Path>>(path: P, net: &PetriNet) -> Result<(), IoError> {
    let format = Format::from_path(&path);
    write_to(path, &NetDescription::from_net(net), format)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::net::types::KindOf;
    use crate::net::value::ValueKind;

    fn sample() -> PetriNet {
        let mut net = PetriNet::new("sample");
        net.declare("limit", 3);
        net.add_place(
            Place::with_type("p", vec![Value::Int(0)], Arc::new(KindOf(ValueKind::Int))).unwrap(),
        )
        .unwrap();
        net.add_place(Place::new("done", [])).unwrap();
        net.add_transition(Transition::with_guard("t", Expression::new("x < limit")))
            .unwrap();
        net.add_input("p", "t", ArcAnnotation::variable("x").unwrap())
            .unwrap();
        net.add_output("p", "t", ArcAnnotation::expression("x + 1"))
            .unwrap();
        net.add_output("done", "t", ArcAnnotation::value(Value::Dot))
            .unwrap();
        net
    }

    #[test]
    fn description_rebuilds_an_equivalent_net() {
        let net = sample();
        let description = NetDescription::from_net(&net);
        assert_eq!(description.places[0].token_type, TypeSpec::Kind(ValueKind::Int));
        let rebuilt = description.clone().into_net().unwrap();
        assert_eq!(NetDescription::from_net(&rebuilt), description);
        assert_eq!(rebuilt.get_marking(), net.get_marking());
        assert!(rebuilt.env().is_global("limit"));
    }

    #[test]
    fn json_and_ron_files_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let net = sample();
        for file in ["net.json", "net.ron"] {
            let path = dir.path().join(file);
            save_net(&path, &net).unwrap();
            let loaded = load_net(&path).unwrap();
            assert_eq!(
                NetDescription::from_net(&loaded),
                NetDescription::from_net(&net)
            );
        }
    }

    #[test]
    fn invalid_descriptions_are_rejected() {
        let json = r#"{
            "name": "bad",
            "places": [{"name": "p"}],
            "transitions": [{"name": "t", "inputs": [["p", {"Expression": "x + 1"}]]}]
        }"#;
        let description: NetDescription = from_json_str(json).unwrap();
        assert!(matches!(description.into_net(), Err(NetError::Structural(_))));
        assert!(matches!(
            from_ron_str::<NetDescription>("(name: "),
            Err(IoError::RonSyntax(_))
        ));
    }
}
