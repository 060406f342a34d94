use std::sync::Arc;

use planwright_exec::secrets::{
    CommandKeySource, CompositeKeySource, EnvKeySource, FileKeySource, KeySource,
};

use crate::KeyArgs;

pub fn build_key_source(args: &KeyArgs) -> Arc<dyn KeySource> {
    let mut keys = CompositeKeySource::new(Vec::new());
    if let Some(dir) = &args.key_dir {
        keys.push(Box::new(FileKeySource::new(dir)));
    }
    if let Some(script) = &args.vault_script {
        keys.push(Box::new(CommandKeySource::new(script)));
    }
    keys.push(Box::new(EnvKeySource::new(args.key_env_prefix.clone())));
    Arc::new(keys)
}
