use std::collections::{HashMap, HashSet};

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

/// In-memory view of the department forest, built from the full department
/// table once per top-level authorization decision and passed by reference
/// through the nested checks of that decision. Never cached across requests.
#[derive(Debug, Clone, Default)]
pub struct OrgSnapshot {
    parents: HashMap<Uuid, Option<Uuid>>,
    children: HashMap<Uuid, Vec<Uuid>>,
    leaders: HashMap<Uuid, HashSet<Uuid>>,
}

impl OrgSnapshot {
    pub fn new(departments: Vec<(Uuid, Option<Uuid>, Vec<Uuid>)>) -> Self {
        let mut parents = HashMap::new();
        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut leaders: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();

        for (id, parent_id, leader_ids) in departments {
            parents.insert(id, parent_id);
            if let Some(parent) = parent_id {
                children.entry(parent).or_default().push(id);
            }
            leaders.insert(id, leader_ids.into_iter().collect());
        }

        Self { parents, children, leaders }
    }

    /// Load the current department forest plus leader assignments.
    /// Two queries, no per-step round-trips afterwards.
    pub async fn load(pool: &SqlitePool) -> AppResult<Self> {
        let dept_rows = sqlx::query("SELECT id, parent_id FROM departments")
            .fetch_all(pool)
            .await?;

        let leader_rows = sqlx::query("SELECT department_id, user_id FROM department_leaders")
            .fetch_all(pool)
            .await?;

        let mut leader_map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for row in &leader_rows {
            let dept = parse_uuid(row.try_get::<String, _>("department_id")?)?;
            let user = parse_uuid(row.try_get::<String, _>("user_id")?)?;
            leader_map.entry(dept).or_default().push(user);
        }

        let mut departments = Vec::with_capacity(dept_rows.len());
        for row in &dept_rows {
            let id = parse_uuid(row.try_get::<String, _>("id")?)?;
            let parent_id = match row.try_get::<Option<String>, _>("parent_id")? {
                Some(s) if !s.is_empty() => Some(parse_uuid(s)?),
                _ => None,
            };
            let leaders = leader_map.remove(&id).unwrap_or_default();
            departments.push((id, parent_id, leaders));
        }

        Ok(Self::new(departments))
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Walk the parent chain from `dept_id` upward looking for `root_id`.
    /// A dangling parent reference ends the chain; a visited set guards
    /// against cycles in malformed data.
    pub fn is_descendant_or_self(&self, dept_id: Uuid, root_id: Uuid) -> bool {
        let mut visited = HashSet::new();
        let mut current = Some(dept_id);

        while let Some(dept) = current {
            if dept == root_id {
                return true;
            }
            if !visited.insert(dept) {
                tracing::warn!(department = %dept, "cycle detected in department parent chain");
                return false;
            }
            current = match self.parents.get(&dept) {
                Some(parent) => *parent,
                // Unknown department: treat as a chain end, not an error.
                None => None,
            };
        }

        false
    }

    /// All departments reachable downward from the given roots. The roots
    /// themselves are not included.
    pub fn collect_descendants(&self, roots: &HashSet<Uuid>) -> HashSet<Uuid> {
        let mut result = HashSet::new();
        let mut stack: Vec<Uuid> = roots.iter().copied().collect();

        while let Some(dept) = stack.pop() {
            if let Some(kids) = self.children.get(&dept) {
                for child in kids {
                    if result.insert(*child) {
                        stack.push(*child);
                    }
                }
            }
        }

        result
    }

    /// Departments the user leads, their descendants, and the led roots
    /// themselves.
    pub fn leader_scope(&self, user_id: Uuid) -> HashSet<Uuid> {
        let roots: HashSet<Uuid> = self
            .leaders
            .iter()
            .filter(|(_, leader_ids)| leader_ids.contains(&user_id))
            .map(|(dept, _)| *dept)
            .collect();

        if roots.is_empty() {
            return HashSet::new();
        }

        let mut scope = self.collect_descendants(&roots);
        scope.extend(roots);
        scope
    }

    /// True iff any department on the parent chain from `dept_id`
    /// (inclusive) lists `user_id` as a leader.
    pub fn leads_chain(&self, user_id: Uuid, dept_id: Uuid) -> bool {
        let mut visited = HashSet::new();
        let mut current = Some(dept_id);

        while let Some(dept) = current {
            if self
                .leaders
                .get(&dept)
                .map(|l| l.contains(&user_id))
                .unwrap_or(false)
            {
                return true;
            }
            if !visited.insert(dept) {
                return false;
            }
            current = self.parents.get(&dept).copied().flatten();
        }

        false
    }
}

fn parse_uuid(value: String) -> AppResult<Uuid> {
    Uuid::parse_str(&value).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))
}
