use std::borrow::Borrow;
use std::hash::Hash;

use fnv::FnvHashMap;

/// Maps the raw user and item identifiers of the input data to consecutive integer indices and
/// back. Indices are handed out in order of first appearance.
pub struct DataDictionary<K> {
    user_dict: FnvHashMap<K, u32>,
    item_dict: FnvHashMap<K, u32>,
    user_ids: Vec<K>,
    item_ids: Vec<K>,
    num_interactions: u64,
}

impl<K: Hash + Eq + Clone> DataDictionary<K> {

    pub fn new() -> Self {
        DataDictionary {
            user_dict: FnvHashMap::with_capacity_and_hasher(100, Default::default()),
            item_dict: FnvHashMap::with_capacity_and_hasher(100, Default::default()),
            user_ids: Vec::with_capacity(100),
            item_ids: Vec::with_capacity(100),
            num_interactions: 0,
        }
    }

    pub fn num_users(&self) -> usize {
        self.user_ids.len()
    }

    pub fn num_items(&self) -> usize {
        self.item_ids.len()
    }

    pub fn num_interactions(&self) -> u64 {
        self.num_interactions
    }

    pub fn user_index<Q>(&self, user: &Q) -> Option<u32>
        where K: Borrow<Q>, Q: Hash + Eq + ?Sized {
        self.user_dict.get(user).cloned()
    }

    pub fn item_index<Q>(&self, item: &Q) -> Option<u32>
        where K: Borrow<Q>, Q: Hash + Eq + ?Sized {
        self.item_dict.get(item).cloned()
    }

    pub fn user_id(&self, user_index: u32) -> Option<&K> {
        self.user_ids.get(user_index as usize)
    }

    pub fn item_id(&self, item_index: u32) -> Option<&K> {
        self.item_ids.get(item_index as usize)
    }

    /// Registers an observed interaction and returns the indices of its user and item.
    pub fn add_interaction(&mut self, user: K, item: K) -> (u32, u32) {
        let user_index = intern(&mut self.user_dict, &mut self.user_ids, user);
        let item_index = intern(&mut self.item_dict, &mut self.item_ids, item);

        self.num_interactions += 1;

        (user_index, item_index)
    }
}

impl<K: Hash + Eq + Clone> Default for DataDictionary<K> {
    fn default() -> Self {
        Self::new()
    }
}

fn intern<K: Hash + Eq + Clone>(dict: &mut FnvHashMap<K, u32>, ids: &mut Vec<K>, id: K) -> u32 {

    if let Some(index) = dict.get(&id) {
        return *index;
    }

    let index = ids.len() as u32;
    ids.push(id.clone());
    dict.insert(id, index);

    index
}
