//! Graph query templates, one per answerable query type.
//!
//! Entity names and limits are always bound parameters.

/// Plans of a disease with their combos, points, combo contents and the
/// disease-level point summary
pub const DISEASE_TO_PLANS: &str = r#"
MATCH (d:Disease {name: $disease_name})-[:HAS_PLAN]->(p:TreatmentPlan)
OPTIONAL MATCH (p)-[:MAIN_POINT]->(mainCombo:AcupointCombo)
OPTIONAL MATCH (p)-[:AUX_POINT]->(auxCombo:AcupointCombo)
OPTIONAL MATCH (p)-[:MAIN_POINT]->(mainPoint:Acupoint)
OPTIONAL MATCH (p)-[:AUX_POINT]->(auxPoint:Acupoint)
OPTIONAL MATCH (mainCombo)-[:HAS_POINT]->(mainStdPoint:Acupoint)
OPTIONAL MATCH (mainCombo)-[:HAS_LOCAL_POINT]->(mainLocalPoint:ComboLocalPoint)
OPTIONAL MATCH (mainCombo)-[:HAS_COMBO]->(mainSubCombo:AcupointCombo)
OPTIONAL MATCH (auxCombo)-[:HAS_POINT]->(auxStdPoint:Acupoint)
OPTIONAL MATCH (auxCombo)-[:HAS_LOCAL_POINT]->(auxLocalPoint:ComboLocalPoint)
OPTIONAL MATCH (auxCombo)-[:HAS_COMBO]->(auxSubCombo:AcupointCombo)
OPTIONAL MATCH (d)-[:MAIN_POINT_SUMMARY]->(mainSummary)
OPTIONAL MATCH (d)-[:AUX_POINT_SUMMARY]->(auxSummary)
RETURN
    d.name AS disease,
    p.plan_id AS plan_id,
    p.method_text AS method_text,
    p.course_text AS course_text,
    p.effect_text AS effect_text,
    p.position_text AS position_text,
    p.effect_level AS effect_level,
    p.has_electroacupuncture AS has_electroacupuncture,
    p.has_moxibustion AS has_moxibustion,
    p.has_drug AS has_drug,
    collect(DISTINCT mainCombo.name) AS main_combos,
    collect(DISTINCT auxCombo.name) AS aux_combos,
    collect(DISTINCT mainPoint.name) AS main_points,
    collect(DISTINCT auxPoint.name) AS aux_points,
    collect(DISTINCT mainStdPoint.name) AS main_combo_std_points,
    collect(DISTINCT mainLocalPoint.name) AS main_combo_local_points,
    collect(DISTINCT mainSubCombo.name) AS main_combo_sub_combos,
    collect(DISTINCT auxStdPoint.name) AS aux_combo_std_points,
    collect(DISTINCT auxLocalPoint.name) AS aux_combo_local_points,
    collect(DISTINCT auxSubCombo.name) AS aux_combo_sub_combos,
    collect(DISTINCT CASE WHEN mainSummary:Acupoint THEN mainSummary.name END) AS disease_main_points,
    collect(DISTINCT CASE WHEN mainSummary:AcupointCombo THEN mainSummary.name END) AS disease_main_combos,
    collect(DISTINCT CASE WHEN auxSummary:Acupoint THEN auxSummary.name END) AS disease_aux_points,
    collect(DISTINCT CASE WHEN auxSummary:AcupointCombo THEN auxSummary.name END) AS disease_aux_combos
ORDER BY p.plan_id
LIMIT $limit
"#;

/// Diseases treated by plans that use a combo, with the combo's own metadata
pub const COMBO_TO_DISEASES: &str = r#"
MATCH (c:AcupointCombo {name: $combo_name})
OPTIONAL MATCH (d:Disease)-[:HAS_PLAN]->(p:TreatmentPlan)-[:MAIN_POINT|AUX_POINT]->(c)
RETURN
    c.name AS combo_name,
    c.indications AS combo_indications,
    c.acupuncture_method_json AS combo_acu_method,
    collect(DISTINCT d.name) AS diseases,
    collect(DISTINCT p.plan_id) AS plan_ids
"#;

/// Plans of a disease that use a combo
pub const DISEASE_COMBO_TO_EFFECT: &str = r#"
MATCH (d:Disease {name: $disease_name})-[:HAS_PLAN]->(p:TreatmentPlan)-[:MAIN_POINT|AUX_POINT]->(c:AcupointCombo {name: $combo_name})
WITH DISTINCT d, c, p
RETURN
    d.name AS disease,
    c.name AS combo_name,
    p.plan_id AS plan_id,
    p.method_text AS method_text,
    p.course_text AS course_text,
    p.effect_text AS effect_text,
    p.position_text AS position_text,
    p.effect_level AS effect_level,
    p.has_electroacupuncture AS has_electroacupuncture,
    p.has_moxibustion AS has_moxibustion,
    p.has_drug AS has_drug
ORDER BY p.plan_id
LIMIT $limit
"#;

/// Standard points and local points of a combo with needling notes, plus sub-combos
pub const COMBO_TO_POINTS: &str = r#"
MATCH (c:AcupointCombo {name: $combo_name})
OPTIONAL MATCH (c)-[r1:HAS_POINT]->(stdPoint:Acupoint)
WITH c, collect(DISTINCT CASE WHEN stdPoint IS NOT NULL
    THEN {name: stdPoint.name, needle_method: r1.needle_method} END) AS std_points
OPTIONAL MATCH (c)-[r2:HAS_LOCAL_POINT]->(localPoint:ComboLocalPoint)
WITH c, std_points, collect(DISTINCT CASE WHEN localPoint IS NOT NULL
    THEN {name: localPoint.name, needle_method: r2.needle_method} END) AS local_points
OPTIONAL MATCH (c)-[:HAS_COMBO]->(subCombo:AcupointCombo)
RETURN
    c.name AS combo_name,
    std_points,
    local_points,
    collect(DISTINCT subCombo.name) AS sub_combos
"#;

/// Disease-level main/auxiliary summary split by node label
pub const DISEASE_TO_POINT_SUMMARY: &str = r#"
MATCH (d:Disease {name: $disease_name})
OPTIONAL MATCH (d)-[:MAIN_POINT_SUMMARY]->(mp)
OPTIONAL MATCH (d)-[:AUX_POINT_SUMMARY]->(ap)
RETURN
    d.name AS disease,
    collect(DISTINCT CASE WHEN mp:Acupoint THEN mp.name END) AS main_points,
    collect(DISTINCT CASE WHEN mp:AcupointCombo THEN mp.name END) AS main_combos,
    collect(DISTINCT CASE WHEN ap:Acupoint THEN ap.name END) AS aux_points,
    collect(DISTINCT CASE WHEN ap:AcupointCombo THEN ap.name END) AS aux_combos
"#;
