//! Arena-backed object graph.
//!
//! All objects of a deployment are owned by one [`PhysicalModel`]; edges are
//! [`ObjectId`] handles. Scheduling happens over the top-level nodes only: a
//! group member is never scheduled on its own, and any edge pointing at a
//! member is redirected to the member's group.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::object::{DatabaseObject, Group, ObjectBody, ObjectId, ObjectKey, ObjectType};

#[derive(Debug, Default)]
pub struct ModelBuilder {
    objects: Vec<DatabaseObject>,
    index: HashMap<ObjectKey, ObjectId>,
    group_of: Vec<Option<ObjectId>>,
    pending: Vec<(ObjectId, ObjectKey)>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object; its `(type, name)` identity must be unique.
    pub fn add(&mut self, object: DatabaseObject) -> Result<ObjectId> {
        if self.index.contains_key(object.key()) {
            return Err(Error::InvalidModel(format!(
                "duplicate object: {}",
                object.type_and_name()
            )));
        }
        let id = ObjectId(self.objects.len());
        self.index.insert(object.key().clone(), id);
        self.objects.push(object);
        self.group_of.push(None);
        Ok(id)
    }

    pub fn find(&self, key: &ObjectKey) -> Option<ObjectId> {
        self.index.get(key).copied()
    }

    /// Explicit edge to an object that may not have been added yet.
    pub fn depends_on(&mut self, id: ObjectId, key: ObjectKey) {
        self.pending.push((id, key));
    }

    pub fn add_dependency(&mut self, id: ObjectId, dependency: ObjectId) -> Result<()> {
        self.check_id(id)?;
        self.check_id(dependency)?;
        if id == dependency {
            return Err(Error::InvalidModel(format!(
                "{} depends on itself",
                self.objects[id.0].type_and_name()
            )));
        }
        self.objects[id.0].dependencies.insert(dependency);
        Ok(())
    }

    /// Wrap already-added objects in a group that deploys them in the
    /// given order. Groups cannot be nested and an object belongs to at
    /// most one group.
    pub fn add_group(
        &mut self,
        schema_name: &str,
        group_name: &str,
        members: Vec<ObjectId>,
    ) -> Result<ObjectId> {
        if members.is_empty() {
            return Err(Error::InvalidModel(format!("group {group_name} has no members")));
        }
        for member in &members {
            self.check_id(*member)?;
            let object = &self.objects[member.0];
            if object.is_group() {
                return Err(Error::InvalidModel(format!(
                    "nested group {} in {group_name}",
                    object.type_and_name()
                )));
            }
            if self.group_of[member.0].is_some() {
                return Err(Error::InvalidModel(format!(
                    "{} already belongs to a group",
                    object.type_and_name()
                )));
            }
        }
        let unique: BTreeSet<ObjectId> = members.iter().copied().collect();
        if unique.len() != members.len() {
            return Err(Error::InvalidModel(format!(
                "group {group_name} lists a member twice"
            )));
        }

        let group = DatabaseObject::new(
            schema_name,
            group_name,
            0,
            ObjectBody::Group(Group {
                members: members.clone(),
            }),
        )?;
        let id = self.add(group)?;
        for member in members {
            self.group_of[member.0] = Some(id);
        }
        Ok(id)
    }

    pub fn build(mut self) -> Result<PhysicalModel> {
        for (id, key) in std::mem::take(&mut self.pending) {
            let dependency = *self.index.get(&key).ok_or_else(|| {
                Error::InvalidModel(format!(
                    "{} depends on unknown object {key}",
                    self.objects[id.0].type_and_name()
                ))
            })?;
            self.add_dependency(id, dependency)?;
        }

        self.add_implicit_edges();
        self.check_group_order()?;
        self.aggregate_group_dependencies();

        let model = PhysicalModel {
            objects: self.objects,
            index: self.index,
            group_of: self.group_of,
        };
        model.topological_order()?;
        Ok(model)
    }

    fn check_id(&self, id: ObjectId) -> Result<()> {
        if id.0 < self.objects.len() {
            Ok(())
        } else {
            Err(Error::InvalidModel(format!("unknown object id {}", id.0)))
        }
    }

    /// Foreign keys and standalone indexes depend on the tables they name,
    /// when those tables are part of the model.
    fn add_implicit_edges(&mut self) {
        let mut edges = Vec::new();
        for (position, object) in self.objects.iter().enumerate() {
            let id = ObjectId(position);
            match object.body() {
                ObjectBody::Table(table) => {
                    for fk in &table.foreign_keys {
                        let schema = fk.referenced_schema.as_deref().unwrap_or(object.schema_name());
                        if let Some(target) = self.find_table(schema, &fk.referenced_table) {
                            if target != id {
                                edges.push((id, target));
                            }
                        }
                    }
                }
                ObjectBody::Index(index) => {
                    if let Some(target) = self.find_table(object.schema_name(), &index.table) {
                        edges.push((id, target));
                    }
                }
                _ => {}
            }
        }
        for (id, target) in edges {
            self.objects[id.0].dependencies.insert(target);
        }
    }

    fn find_table(&self, schema: &str, name: &str) -> Option<ObjectId> {
        let key = ObjectKey::new(ObjectType::Table, name);
        self.index
            .get(&key)
            .copied()
            .filter(|id| self.objects[id.0].schema_name() == schema)
    }

    /// Members run in declaration order, so no member may depend on a
    /// member declared after it.
    fn check_group_order(&self) -> Result<()> {
        for group in self.objects.iter().filter(|o| o.is_group()) {
            let members = group.members();
            for (position, member) in members.iter().enumerate() {
                let later = &members[position + 1..];
                let object = &self.objects[member.0];
                if let Some(dep) = object.dependencies().iter().find(|dep| later.contains(dep)) {
                    return Err(Error::InvalidModel(format!(
                        "{} in {} depends on later member {}",
                        object.type_and_name(),
                        group.type_and_name(),
                        self.objects[dep.0].type_and_name()
                    )));
                }
            }
        }
        Ok(())
    }

    fn aggregate_group_dependencies(&mut self) {
        let groups: Vec<ObjectId> = (0..self.objects.len())
            .map(ObjectId)
            .filter(|id| self.objects[id.0].is_group())
            .collect();

        for group in groups {
            let members: BTreeSet<ObjectId> =
                self.objects[group.0].members().iter().copied().collect();

            let mut collected = Vec::new();
            for member in &members {
                self.objects[member.0].fetch_dependencies_to(&mut collected);
            }

            let external: BTreeSet<ObjectId> = collected
                .into_iter()
                .filter(|dep| !members.contains(dep))
                .collect();
            self.objects[group.0].dependencies.extend(external);
        }
    }
}

/// The complete, validated set of objects for one deployment.
#[derive(Debug)]
pub struct PhysicalModel {
    objects: Vec<DatabaseObject>,
    index: HashMap<ObjectKey, ObjectId>,
    group_of: Vec<Option<ObjectId>>,
}

impl PhysicalModel {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Ids are only ever handed out by the builder of this model.
    pub fn get(&self, id: ObjectId) -> &DatabaseObject {
        &self.objects[id.0]
    }

    pub fn find(&self, key: &ObjectKey) -> Option<ObjectId> {
        self.index.get(key).copied()
    }

    pub fn group_of(&self, id: ObjectId) -> Option<ObjectId> {
        self.group_of[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &DatabaseObject)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(position, object)| (ObjectId(position), object))
    }

    /// Objects scheduled on their own: groups and ungrouped objects.
    pub fn top_level(&self) -> impl Iterator<Item = ObjectId> + '_ {
        (0..self.objects.len())
            .map(ObjectId)
            .filter(|id| self.group_of[id.0].is_none())
    }

    /// Top-level predecessors of a top-level object.
    pub fn deployment_dependencies(&self, id: ObjectId) -> BTreeSet<ObjectId> {
        self.objects[id.0]
            .dependencies()
            .iter()
            .map(|dep| self.group_of[dep.0].unwrap_or(*dep))
            .filter(|dep| *dep != id)
            .collect()
    }

    pub fn dependency_map(&self) -> BTreeMap<ObjectId, BTreeSet<ObjectId>> {
        self.top_level()
            .map(|id| (id, self.deployment_dependencies(id)))
            .collect()
    }

    /// Kahn's algorithm over the top-level nodes; ties are broken by
    /// declaration order so the result is deterministic.
    pub fn topological_order(&self) -> Result<Vec<ObjectId>> {
        let dependencies = self.dependency_map();
        let mut dependents: BTreeMap<ObjectId, BTreeSet<ObjectId>> = BTreeMap::new();
        let mut indegree: BTreeMap<ObjectId, usize> = BTreeMap::new();

        for (node, deps) in &dependencies {
            indegree.insert(*node, deps.len());
            for dep in deps {
                dependents.entry(*dep).or_default().insert(*node);
            }
        }

        let mut ready: BTreeSet<ObjectId> = indegree
            .iter()
            .filter_map(|(node, count)| (*count == 0).then_some(*node))
            .collect();

        let mut order = Vec::with_capacity(dependencies.len());
        while let Some(node) = ready.pop_first() {
            order.push(node);
            if let Some(targets) = dependents.get(&node) {
                for target in targets {
                    if let Some(count) = indegree.get_mut(target) {
                        *count = count.saturating_sub(1);
                        if *count == 0 {
                            ready.insert(*target);
                        }
                    }
                }
            }
        }

        if order.len() == dependencies.len() {
            Ok(order)
        } else {
            let cycle_nodes: Vec<String> = indegree
                .into_iter()
                .filter(|(_, count)| *count > 0)
                .map(|(node, _)| self.objects[node.0].type_and_name())
                .collect();
            Err(Error::Cycle(cycle_nodes))
        }
    }

    /// Teardown order: dependents before their dependencies.
    pub fn drop_order(&self) -> Result<Vec<ObjectId>> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }

    /// Every object in deployment order with groups expanded into their
    /// members, as used by `plan`.
    pub fn flattened_order(&self) -> Result<Vec<ObjectId>> {
        let mut flat = Vec::with_capacity(self.objects.len());
        for id in self.topological_order()? {
            let object = &self.objects[id.0];
            if object.is_group() {
                flat.extend(object.members().iter().copied());
            } else {
                flat.push(id);
            }
        }
        Ok(flat)
    }
}

#[cfg(test)]
mod tests {
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::constraints::{FkAction, ForeignKey};
    use crate::object::TableBuilder;

    fn sequence(name: &str) -> DatabaseObject {
        DatabaseObject::sequence("FHIRDATA", name, 1, 1, 1).unwrap()
    }

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new(ObjectType::Sequence, name)
    }

    #[test]
    fn group_exposes_only_external_dependencies() {
        let mut builder = ModelBuilder::new();
        let x = builder.add(sequence("X")).unwrap();
        let m1 = builder.add(sequence("M1")).unwrap();
        let m2 = builder.add(sequence("M2")).unwrap();
        builder.add_dependency(m1, x).unwrap();
        builder.add_dependency(m2, m1).unwrap();
        let group = builder.add_group("FHIRDATA", "G", vec![m1, m2]).unwrap();

        let model = builder.build().unwrap();
        let expected: BTreeSet<ObjectId> = [x].into_iter().collect();
        assert_eq!(model.get(group).dependencies(), &expected);
        assert_eq!(model.get(group).version(), 0);
        assert_eq!(model.group_of(m2), Some(group));
        assert_eq!(model.topological_order().unwrap(), vec![x, group]);
        assert_eq!(model.flattened_order().unwrap(), vec![x, m1, m2]);
    }

    #[test]
    fn edges_into_a_member_schedule_after_the_group() {
        let mut builder = ModelBuilder::new();
        let m1 = builder.add(sequence("M1")).unwrap();
        let group = builder.add_group("FHIRDATA", "G", vec![m1]).unwrap();
        let y = builder.add(sequence("Y")).unwrap();
        builder.add_dependency(y, m1).unwrap();

        let model = builder.build().unwrap();
        assert_eq!(model.deployment_dependencies(y), [group].into_iter().collect());
        assert_eq!(model.topological_order().unwrap(), vec![group, y]);
        assert_eq!(model.drop_order().unwrap(), vec![y, group]);
    }

    #[test]
    fn cycle_is_a_configuration_error() {
        let mut builder = ModelBuilder::new();
        let a = builder.add(sequence("A")).unwrap();
        let b = builder.add(sequence("B")).unwrap();
        let c = builder.add(sequence("C")).unwrap();
        builder.depends_on(a, key("B"));
        builder.depends_on(b, key("C"));
        builder.depends_on(c, key("A"));

        match builder.build() {
            Err(Error::Cycle(nodes)) => {
                assert_eq!(nodes, vec!["SEQUENCE:A", "SEQUENCE:B", "SEQUENCE:C"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_models() {
        let mut builder = ModelBuilder::new();
        builder.add(sequence("A")).unwrap();
        assert!(builder.add(sequence("A")).is_err());

        let mut builder = ModelBuilder::new();
        let a = builder.add(sequence("A")).unwrap();
        builder.depends_on(a, key("MISSING"));
        assert!(matches!(builder.build(), Err(Error::InvalidModel(_))));

        let mut builder = ModelBuilder::new();
        let a = builder.add(sequence("A")).unwrap();
        let inner = builder.add_group("FHIRDATA", "INNER", vec![a]).unwrap();
        assert!(builder.add_group("FHIRDATA", "OUTER", vec![inner]).is_err());

        let mut builder = ModelBuilder::new();
        let a = builder.add(sequence("A")).unwrap();
        let b = builder.add(sequence("B")).unwrap();
        builder.add_dependency(a, b).unwrap();
        builder.add_group("FHIRDATA", "G", vec![a, b]).unwrap();
        assert!(matches!(builder.build(), Err(Error::InvalidModel(_))));
    }

    #[test]
    fn foreign_keys_and_indexes_add_implicit_edges() {
        let mut builder = ModelBuilder::new();
        let observation = builder
            .add(
                TableBuilder::new("FHIRDATA", "OBSERVATION")
                    .bigint_column("ID", false)
                    .bigint_column("PATIENT_ID", false)
                    .foreign_key(ForeignKey {
                        name: "FK_OBS_PATIENT".to_string(),
                        columns: vec!["PATIENT_ID".to_string()],
                        referenced_schema: None,
                        referenced_table: "PATIENT".to_string(),
                        referenced_columns: vec!["ID".to_string()],
                        on_delete: FkAction::NoAction,
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let patient = builder
            .add(
                TableBuilder::new("FHIRDATA", "PATIENT")
                    .bigint_column("ID", false)
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let model = builder.build().unwrap();
        assert!(model.get(observation).dependencies().contains(&patient));
        assert_eq!(model.topological_order().unwrap(), vec![patient, observation]);
    }

    #[test]
    fn random_dags_order_dependencies_first() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);

        for _ in 0..50 {
            let size = rng.random_range(1..40);
            let mut ranks: Vec<usize> = (0..size).collect();
            ranks.shuffle(&mut rng);

            let mut builder = ModelBuilder::new();
            let ids: Vec<ObjectId> = ranks
                .iter()
                .map(|rank| builder.add(sequence(&format!("S{rank}"))).unwrap())
                .collect();

            let mut edges = Vec::new();
            for (i, rank_i) in ranks.iter().enumerate() {
                for (j, rank_j) in ranks.iter().enumerate() {
                    if rank_j < rank_i && rng.random_bool(0.2) {
                        builder.add_dependency(ids[i], ids[j]).unwrap();
                        edges.push((ids[i], ids[j]));
                    }
                }
            }

            let model = builder.build().unwrap();
            let order = model.topological_order().unwrap();
            assert_eq!(order.len(), size);

            let position: HashMap<ObjectId, usize> =
                order.iter().enumerate().map(|(p, id)| (*id, p)).collect();
            for (dependent, dependency) in edges {
                assert!(position[&dependency] < position[&dependent]);
            }
        }
    }
}
